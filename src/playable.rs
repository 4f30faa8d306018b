// src/playable.rs
//
// Start/stop lifecycle shared by voices and the transport.

use std::fmt;

use log::error;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Never started, or stopped at or before the query time
    Idle,
    /// Start time is still in the future
    Cued,
    Playing,
}

impl PlaybackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Cued => "cued",
            PlaybackStatus::Playing => "playing",
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle misuse. Logged loudly, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayableError {
    #[error("start at {time:.3}s while {status} since {start_time:.3}s")]
    AlreadyStarted {
        time: f64,
        start_time: f64,
        status: PlaybackStatus,
    },

    #[error("stop at {time:.3}s but never started")]
    NotStarted { time: f64 },

    #[error("stop at {time:.3}s but already stopped at {stop_time:.3}s")]
    AlreadyStopped { time: f64, stop_time: f64 },
}

/// Scheduled start and stop times.
///
/// A playable can be started and stopped repeatedly, but not started while
/// cued or playing, nor stopped while idle. Misuse leaves the times
/// untouched and is reported as an error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Playable {
    start_time: Option<f64>,
    stop_time: Option<f64>,
}

impl Playable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    #[inline]
    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    pub fn status(&self, now: f64) -> PlaybackStatus {
        match (self.start_time, self.stop_time) {
            (None, _) => PlaybackStatus::Idle,
            (Some(start), _) if now < start => PlaybackStatus::Cued,
            (Some(_), Some(stop)) if stop <= now => PlaybackStatus::Idle,
            (Some(_), _) => PlaybackStatus::Playing,
        }
    }

    #[inline]
    pub fn is_idle(&self, now: f64) -> bool {
        self.status(now) == PlaybackStatus::Idle
    }

    pub fn start(&mut self, time: f64) -> Result<(), PlayableError> {
        let status = self.status(time);
        if let (Some(start_time), false) = (self.start_time, status == PlaybackStatus::Idle) {
            let err = PlayableError::AlreadyStarted {
                time,
                start_time,
                status,
            };
            error!("{}", err);
            return Err(err);
        }

        self.start_time = Some(time);
        self.stop_time = None;
        Ok(())
    }

    /// Schedule a stop, clamped so it never precedes the start.
    pub fn stop(&mut self, time: f64) -> Result<(), PlayableError> {
        let err = match (self.start_time, self.stop_time) {
            (None, _) => PlayableError::NotStarted { time },
            (Some(_), Some(stop_time)) if stop_time <= time => {
                PlayableError::AlreadyStopped { time, stop_time }
            }
            (Some(start_time), _) => {
                self.stop_time = Some(time.max(start_time));
                return Ok(());
            }
        };

        error!("{}", err);
        Err(err)
    }

    /// Forget both times.
    pub fn reset(&mut self) {
        self.start_time = None;
        self.stop_time = None;
    }
}
