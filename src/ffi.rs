// C-compatible FFI bindings for Swift/iOS integration.
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - String parameters must be valid UTF-8 (Swift strings are always valid)
// - Caller must call the corresponding _destroy function for each _create

use std::ffi::{CStr, c_char};

use log::{LevelFilter, warn};
use oslog::OsLogger;

use crate::address::CurveType;
use crate::config::EngineConfig;
use crate::event::{EVENT_SIZE, Event};
use crate::parse::parse_events;
use crate::scheduler::Scheduler;
use crate::transport::Transport;

// Logger subsystem identifier
const LOG_SUBSYSTEM: &str = "com.cueline.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup, before any other function here.
#[unsafe(no_mangle)]
pub extern "C" fn cueline_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to a standalone transport.
pub struct CuelineTransport {
    inner: Transport,
}

/// Opaque handle to a scheduler plus the events it has dispatched.
pub struct CuelineScheduler {
    inner: Scheduler,
    pending: Vec<Event>,
}

/// Scheduling configuration.
#[repr(C)]
pub struct CuelineConfig {
    pub lookahead: f64,
    pub frame_duration: f64,
    pub buffer_capacity: u32,
    /// Beats per second
    pub default_rate: f64,
    pub release: f64,
}

impl From<EngineConfig> for CuelineConfig {
    fn from(c: EngineConfig) -> Self {
        Self {
            lookahead: c.lookahead,
            frame_duration: c.frame_duration,
            buffer_capacity: u32::try_from(c.buffer_capacity).unwrap_or(u32::MAX),
            default_rate: c.default_rate,
            release: c.release,
        }
    }
}

impl From<&CuelineConfig> for EngineConfig {
    fn from(c: &CuelineConfig) -> Self {
        Self {
            lookahead: c.lookahead,
            frame_duration: c.frame_duration,
            buffer_capacity: c.buffer_capacity as usize,
            default_rate: c.default_rate,
            release: c.release,
        }
    }
}

/// Get the default configuration values.
#[unsafe(no_mangle)]
pub extern "C" fn cueline_default_config() -> CuelineConfig {
    EngineConfig::default().into()
}

fn curve_from_code(code: u8) -> Option<CurveType> {
    match CurveType::from_code(code) {
        Ok(curve) => Some(curve),
        Err(err) => {
            warn!("rejecting curve code {}: {}", code, err);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════

/// Create a transport at `rate` beats per second.
///
/// Returns an opaque pointer that must be freed with `transport_destroy`.
#[unsafe(no_mangle)]
pub extern "C" fn transport_create(rate: f64) -> *mut CuelineTransport {
    Box::into_raw(Box::new(CuelineTransport {
        inner: Transport::new(rate),
    }))
}

/// Destroy a transport.
///
/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_destroy(transport: *mut CuelineTransport) {
    if !transport.is_null() {
        unsafe { drop(Box::from_raw(transport)) };
    }
}

/// Start the transport at `time`, at beat `location`.
///
/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_start(transport: *mut CuelineTransport, time: f64, location: f64) -> bool {
    let Some(t) = (unsafe { transport.as_mut() }) else {
        return false;
    };
    t.inner.start(time, location).is_ok()
}

/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_beat_at_time(transport: *mut CuelineTransport, time: f64) -> f64 {
    match unsafe { transport.as_mut() } {
        Some(t) => t.inner.beat_at_time(time),
        None => 0.0,
    }
}

/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_time_at_beat(transport: *mut CuelineTransport, beat: f64) -> f64 {
    match unsafe { transport.as_mut() } {
        Some(t) => t.inner.time_at_beat(beat),
        None => 0.0,
    }
}

/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_bar_at_time(transport: *mut CuelineTransport, time: f64) -> f64 {
    match unsafe { transport.as_mut() } {
        Some(t) => t.inner.bar_at_time(time),
        None => 0.0,
    }
}

/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_time_at_bar(transport: *mut CuelineTransport, bar: f64) -> f64 {
    match unsafe { transport.as_mut() } {
        Some(t) => t.inner.time_at_bar(bar),
        None => 0.0,
    }
}

/// Tempo in beats per minute at `time`.
///
/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_tempo_at_time(transport: *const CuelineTransport, time: f64) -> f64 {
    match unsafe { transport.as_ref() } {
        Some(t) => t.inner.tempo_at_time(time),
        None => 0.0,
    }
}

/// Change tempo (beats per minute) with curve code `curve`.
///
/// Returns false for a null handle or an invalid curve code.
///
/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_set_tempo_at_time(
    transport: *mut CuelineTransport,
    time: f64,
    curve: u8,
    bpm: f64,
    duration: f64,
) -> bool {
    let Some(t) = (unsafe { transport.as_mut() }) else {
        return false;
    };
    let Some(curve) = curve_from_code(curve) else {
        return false;
    };
    t.inner.set_tempo_at_time(time, curve, bpm, duration);
    true
}

/// Change meter from `beat` onward.
///
/// # Safety
/// `transport` must be a valid pointer returned by `transport_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn transport_set_meter_at_beat(
    transport: *mut CuelineTransport,
    beat: f64,
    bar: f64,
    division: f64,
) -> bool {
    let Some(t) = (unsafe { transport.as_mut() }) else {
        return false;
    };
    match t.inner.set_meter_at_beat(beat, bar, division) {
        Ok(()) => true,
        Err(err) => {
            warn!("rejecting meter change: {}", err);
            false
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════

/// Create a scheduler. `config` may be NULL for defaults.
///
/// # Safety
/// `config` must be NULL or a valid pointer to a CuelineConfig struct.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scheduler_create(config: *const CuelineConfig) -> *mut CuelineScheduler {
    let config = match unsafe { config.as_ref() } {
        Some(c) => EngineConfig::from(c),
        None => EngineConfig::default(),
    };
    Box::into_raw(Box::new(CuelineScheduler {
        inner: Scheduler::new(&config),
        pending: Vec::new(),
    }))
}

/// Destroy a scheduler.
///
/// # Safety
/// `scheduler` must be a valid pointer returned by `scheduler_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scheduler_destroy(scheduler: *mut CuelineScheduler) {
    if !scheduler.is_null() {
        unsafe { drop(Box::from_raw(scheduler)) };
    }
}

/// Replace the sequence with events parsed from `text`, one per line.
///
/// Returns false (and keeps the old sequence) if any line fails to parse.
///
/// # Safety
/// `scheduler` must be valid; `text` must be a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scheduler_load(scheduler: *mut CuelineScheduler, text: *const c_char) -> bool {
    let Some(s) = (unsafe { scheduler.as_mut() }) else {
        return false;
    };
    if text.is_null() {
        return false;
    }
    let Ok(text) = (unsafe { CStr::from_ptr(text) }).to_str() else {
        warn!("rejecting sequence: not valid UTF-8");
        return false;
    };

    match parse_events(text) {
        Ok(events) => {
            s.inner.set_sequence(events);
            true
        }
        Err(err) => {
            warn!("rejecting sequence: {}", err);
            false
        }
    }
}

/// # Safety
/// `scheduler` must be a valid pointer returned by `scheduler_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scheduler_start(scheduler: *mut CuelineScheduler, time: f64, location: f64) -> bool {
    match unsafe { scheduler.as_mut() } {
        Some(s) => s.inner.start(time, location).is_ok(),
        None => false,
    }
}

/// # Safety
/// `scheduler` must be a valid pointer returned by `scheduler_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scheduler_stop(scheduler: *mut CuelineScheduler, time: f64) -> bool {
    match unsafe { scheduler.as_mut() } {
        Some(s) => s.inner.stop(time).is_ok(),
        None => false,
    }
}

/// Schedule up to `now + lookahead + frame_duration`.
///
/// Returns the number of events now waiting in `scheduler_drain`.
///
/// # Safety
/// `scheduler` must be a valid pointer returned by `scheduler_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scheduler_tick(scheduler: *mut CuelineScheduler, now: f64) -> u32 {
    let Some(s) = (unsafe { scheduler.as_mut() }) else {
        return 0;
    };
    s.inner.tick(now, &mut s.pending);
    s.pending.len() as u32
}

/// Copy up to `max_events` pending events into `out` in wire layout
/// (`EVENT_SIZE` f64 per event). Returns the number of events copied.
///
/// # Safety
/// `scheduler` must be valid; `out` must point to at least
/// `max_events * 4` writable f64 values.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn scheduler_drain(scheduler: *mut CuelineScheduler, out: *mut f64, max_events: u32) -> u32 {
    let Some(s) = (unsafe { scheduler.as_mut() }) else {
        return 0;
    };
    if out.is_null() {
        return 0;
    }

    let count = s.pending.len().min(max_events as usize);
    let slots = unsafe { std::slice::from_raw_parts_mut(out, count * EVENT_SIZE) };
    for (slot, event) in slots.chunks_exact_mut(EVENT_SIZE).zip(s.pending.drain(..count)) {
        slot.copy_from_slice(&event.to_wire());
    }
    count as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_capacity_saturates() {
        let config = EngineConfig {
            buffer_capacity: usize::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(CuelineConfig::from(config).buffer_capacity, u32::MAX);

        let defaults = cueline_default_config();
        assert_eq!(
            defaults.buffer_capacity as usize,
            EngineConfig::default().buffer_capacity
        );
    }
}
