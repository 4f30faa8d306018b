// src/scheduler.rs

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::address::{CurveType, Name};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::distributor::EventSink;
use crate::event::Event;
use crate::event_buffer::EventBuffer;
use crate::playable::PlayableError;
use crate::timer::{Timer, TimerError};
use crate::transport::Transport;

/// Turns a beat-keyed sequence into time-stamped event buffers.
///
/// On each tick the scheduler covers the wall-clock window from the end of
/// the previous window up to `now + lookahead + frame_duration`, collects
/// every sequence event whose beat falls inside it, stamps each with the
/// exact time of its beat and dispatches them as one ordered buffer.
///
/// Local `rate` and `meter` events are applied to the transport instead of
/// being dispatched.
///
/// This struct is NOT real-time safe. It runs on the timer thread.
pub struct Scheduler {
    transport: Transport,

    /// Beat-keyed events, in beat order
    sequence: Vec<Event>,

    /// Index of the next sequence event to schedule
    cursor: usize,

    /// End of the last window dispatched
    window_end: Option<f64>,

    lookahead: f64,
    frame_duration: f64,

    /// Pre-allocated buffer for one window
    buffer: EventBuffer,
}

impl Scheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            transport: Transport::from_config(config),
            sequence: Vec::new(),
            cursor: 0,
            window_end: None,
            lookahead: config.lookahead,
            frame_duration: config.frame_duration,
            buffer: EventBuffer::with_capacity(config.buffer_capacity.max(1)),
        }
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    #[inline]
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    #[inline]
    pub fn sequence(&self) -> &[Event] {
        &self.sequence
    }

    /// End of the last window dispatched.
    #[inline]
    pub fn window_end(&self) -> Option<f64> {
        self.window_end
    }

    // -------------------------------
    // MARK: Sequence
    // -------------------------------

    /// Replace the sequence. Event times are in beats.
    ///
    /// Events at beats already scheduled are not replayed.
    pub fn set_sequence(&mut self, mut events: Vec<Event>) {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.sequence = events;

        let from = match self.window_end {
            Some(end) => self.transport.beat_at_time(end),
            None => self.transport.start_location(),
        };
        self.cursor = self.sequence.partition_point(|e| e.time < from);
    }

    // -------------------------------
    // MARK: Lifecycle
    // -------------------------------

    /// Start playing the sequence from beat `location` at `time`.
    pub fn start(&mut self, time: f64, location: f64) -> Result<(), PlayableError> {
        self.transport.start(time, location)?;
        self.window_end = None;
        self.cursor = self.sequence.partition_point(|e| e.time < location);
        Ok(())
    }

    /// Stop dispatching at `time`.
    pub fn stop(&mut self, time: f64) -> Result<(), PlayableError> {
        self.transport.stop(time)
    }

    // -------------------------------
    // MARK: Scheduling loop
    // -------------------------------

    /// Schedule the window ending at `now + lookahead + frame_duration`.
    ///
    /// Returns the number of events dispatched to `sink`.
    pub fn tick(&mut self, now: f64, sink: &mut dyn EventSink) -> usize {
        if !self.transport.is_started() {
            return 0;
        }

        let start = self.transport.start_time();
        let t1 = self.window_end.unwrap_or(start).max(start);
        let mut t2 = now + self.lookahead + self.frame_duration;
        if let Some(stop) = self.transport.stop_time() {
            t2 = t2.min(stop);
        }
        if t2 <= t1 {
            return 0;
        }

        let b1 = self.transport.beat_at_time(t1);
        let mut b2 = self.transport.beat_at_time(t2);
        let mut dispatched = 0;

        while let Some(&event) = self.sequence.get(self.cursor) {
            if event.time >= b2 {
                break;
            }
            self.cursor += 1;

            if event.time < b1 {
                warn!("skipping event at beat {} behind window start {}", event.time, b1);
                continue;
            }

            let time = self.transport.time_at_beat(event.time);

            if event.address.is_local() {
                match event.name() {
                    Name::RATE => {
                        self.transport
                            .set_rate_at_time(time, event.curve(), event.value1, event.value2);
                        // The rest of the window moves with the new tempo
                        b2 = self.transport.beat_at_time(t2);
                        continue;
                    }
                    Name::METER => {
                        if let Err(err) =
                            self.transport
                                .set_meter_at_beat(event.time, event.value1, event.value2.max(1.0))
                        {
                            warn!("dropping meter event at beat {}: {}", event.time, err);
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            if self.buffer.remaining() == 0 {
                dispatched += self.flush(sink);
            }

            // Equal beats can come back a hair apart after inversion
            let time = self.buffer.last_time().map_or(time, |last| time.max(last));
            if let Err(err) = self.buffer.push_event(event.at(time)) {
                warn!("dropping event {}: {}", event, err);
            }
        }

        dispatched += self.flush(sink);
        self.window_end = Some(t2);

        if dispatched > 0 {
            debug!(
                "window [{:.3}, {:.3}) beats [{:.3}, {:.3}): {} events",
                t1, t2, b1, b2, dispatched
            );
        }
        dispatched
    }

    fn flush(&mut self, sink: &mut dyn EventSink) -> usize {
        let count = self.buffer.len();
        if count > 0 {
            sink.push(self.buffer.as_slice());
            self.buffer.clear();
        }
        count
    }

    /// Whether every sequence event has been scheduled.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.sequence.len()
    }

    /// Drive this scheduler from a timer thread until the timer is dropped.
    pub fn spawn<S>(mut self, clock: Arc<dyn Clock>, mut sink: S, interval: Duration) -> Result<Timer, TimerError>
    where
        S: EventSink + Send + 'static,
    {
        Timer::spawn(interval, move |_| {
            let now = clock.current_time();
            self.tick(now, &mut sink);
        })
    }
}

/// Set events for a tempo in beats per minute, for building sequences.
pub fn tempo_event(beat: f64, bpm: f64) -> Event {
    Event::local(beat, Name::RATE, CurveType::Set, bpm / 60.0, 0.0)
}
