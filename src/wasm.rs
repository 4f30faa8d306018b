//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { cueline_init, CuelineScheduler } from './cueline.js';
//!
//! await init();
//! cueline_init();
//!
//! const scheduler = new CuelineScheduler();
//! scheduler.load("0 1.start 60 1\n1 1.stop 60");
//! scheduler.start(audioContext.currentTime, 0);
//!
//! // From a worker timer
//! const events = scheduler.tick(audioContext.currentTime);
//! ```

use wasm_bindgen::prelude::*;

use crate::address::CurveType;
use crate::config::EngineConfig;
use crate::event::{EVENT_SIZE, Event};
use crate::parse::{parse_event, parse_events};
use crate::scheduler::Scheduler;
use crate::transport::Transport;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn cueline_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

/// Normalize one event line, e.g. `"1 2.gain 0.50 linear"`, to its canonical form.
#[wasm_bindgen]
pub fn cueline_format_event(line: &str) -> Result<String, JsError> {
    let event = parse_event(line)?;
    Ok(event.to_string())
}

fn curve(code: u8) -> Result<CurveType, JsError> {
    Ok(CurveType::from_code(code)?)
}

// ═══════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════

/// Tempo and meter state for beat/time/bar conversion.
#[wasm_bindgen]
pub struct CuelineTransport {
    inner: Transport,
}

#[wasm_bindgen]
impl CuelineTransport {
    /// Create a transport at `bpm` beats per minute.
    #[wasm_bindgen(constructor)]
    pub fn new(bpm: f64) -> CuelineTransport {
        Self {
            inner: Transport::new(bpm / 60.0),
        }
    }

    pub fn start(&mut self, time: f64, location: f64) -> Result<(), JsError> {
        Ok(self.inner.start(time, location)?)
    }

    pub fn beat_at_time(&mut self, time: f64) -> f64 {
        self.inner.beat_at_time(time)
    }

    pub fn time_at_beat(&mut self, beat: f64) -> f64 {
        self.inner.time_at_beat(beat)
    }

    pub fn bar_at_time(&mut self, time: f64) -> f64 {
        self.inner.bar_at_time(time)
    }

    pub fn time_at_bar(&mut self, bar: f64) -> f64 {
        self.inner.time_at_bar(bar)
    }

    pub fn tempo_at_time(&self, time: f64) -> f64 {
        self.inner.tempo_at_time(time)
    }

    /// Change tempo (bpm). `curve_code` is the numeric curve code.
    pub fn set_tempo_at_time(&mut self, time: f64, curve_code: u8, bpm: f64, duration: f64) -> Result<(), JsError> {
        self.inner
            .set_tempo_at_time(time, curve(curve_code)?, bpm, duration);
        Ok(())
    }

    pub fn set_meter_at_beat(&mut self, beat: f64, bar: f64, division: f64) -> Result<(), JsError> {
        Ok(self.inner.set_meter_at_beat(beat, bar, division)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════

/// Lookahead scheduler driven from JavaScript.
///
/// `tick` returns the dispatched events flattened in wire layout.
#[wasm_bindgen]
pub struct CuelineScheduler {
    inner: Scheduler,
    out: Vec<Event>,
}

#[wasm_bindgen]
impl CuelineScheduler {
    #[wasm_bindgen(constructor)]
    pub fn new() -> CuelineScheduler {
        Self {
            inner: Scheduler::new(&EngineConfig::default()),
            out: Vec::new(),
        }
    }

    /// Replace the sequence with events parsed from `text`.
    pub fn load(&mut self, text: &str) -> Result<(), JsError> {
        let events = parse_events(text)?;
        self.inner.set_sequence(events);
        Ok(())
    }

    pub fn start(&mut self, time: f64, location: f64) -> Result<(), JsError> {
        Ok(self.inner.start(time, location)?)
    }

    pub fn stop(&mut self, time: f64) -> Result<(), JsError> {
        Ok(self.inner.stop(time)?)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Schedule the next window and return its events, 4 numbers each.
    pub fn tick(&mut self, now: f64) -> Vec<f64> {
        self.out.clear();
        self.inner.tick(now, &mut self.out);

        let mut flat = Vec::with_capacity(self.out.len() * EVENT_SIZE);
        for event in &self.out {
            flat.extend_from_slice(&event.to_wire());
        }
        flat
    }
}

impl Default for CuelineScheduler {
    fn default() -> Self {
        Self::new()
    }
}
