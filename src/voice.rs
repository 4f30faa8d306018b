// src/voice.rs

use log::debug;

use crate::address::{CurveType, Name};
use crate::automation::{AutomatedParam, T60};
use crate::config::EngineConfig;
use crate::parameter::{ControlTarget, RecordedParam};
use crate::playable::Playable;

/// Default attack time constant, in seconds.
pub const DEFAULT_ATTACK: f64 = 0.004;

/// Frequency of a MIDI note number in Hz (A4 = 69 = 440Hz).
#[inline]
pub fn note_to_frequency(note: f64) -> f64 {
    440.0 * 2f64.powf((note - 69.0) / 12.0)
}

/// One reusable monophonic processing unit.
///
/// A voice is idle when it has never been started, or when its stop time
/// is at or before the query time. The stop time reported here is the time
/// the voice has fully finished sounding, not the time `stop` was called.
pub trait Voice {
    fn start(&mut self, time: f64, note: f64, velocity: f64);

    fn stop(&mut self, time: f64);

    /// Clear lifecycle state before the voice is reused.
    fn reset(&mut self);

    fn start_time(&self) -> Option<f64>;

    fn stop_time(&self) -> Option<f64>;

    fn is_idle(&self, now: f64) -> bool {
        match (self.start_time(), self.stop_time()) {
            (None, _) => true,
            (Some(_), Some(stop)) => stop <= now,
            (Some(_), None) => false,
        }
    }

    /// Automate a named control target on this voice.
    ///
    /// Returns false if there is no such target.
    fn automate(&mut self, _name: Name, _time: f64, _curve: CurveType, _value: f64, _duration: f64) -> bool {
        false
    }
}

/// Envelope voice: a gain target approached on start and released on stop.
///
/// This struct:
/// - attacks towards the start velocity with time constant `attack`
/// - on stop, freezes the envelope and releases to 0 with time constant `release`
/// - becomes idle `release * T60` after stop, when the release is inaudible
#[derive(Debug, Clone)]
pub struct Monophonic<T: ControlTarget = RecordedParam> {
    playable: Playable,
    gain: AutomatedParam<T>,
    frequency: AutomatedParam<T>,
    attack: f64,
    release: f64,
}

impl Monophonic<RecordedParam> {
    /// A voice driving in-memory parameters.
    pub fn recorded(config: &EngineConfig) -> Self {
        Self::new(
            RecordedParam::new(0.0),
            RecordedParam::new(440.0),
            DEFAULT_ATTACK,
            config.release,
        )
    }
}

impl<T: ControlTarget> Monophonic<T> {
    pub fn new(gain: T, frequency: T, attack: f64, release: f64) -> Self {
        Self {
            playable: Playable::new(),
            gain: AutomatedParam::new(gain),
            frequency: AutomatedParam::new(frequency),
            attack,
            release,
        }
    }

    #[inline]
    pub fn gain(&self) -> &AutomatedParam<T> {
        &self.gain
    }

    #[inline]
    pub fn frequency(&self) -> &AutomatedParam<T> {
        &self.frequency
    }

    #[inline]
    pub fn release(&self) -> f64 {
        self.release
    }

    pub fn set_release(&mut self, release: f64) {
        self.release = release;
    }
}

impl<T: ControlTarget> Voice for Monophonic<T> {
    fn start(&mut self, time: f64, note: f64, velocity: f64) {
        if self.playable.start(time).is_err() {
            return;
        }

        self.frequency
            .automate(time, CurveType::Set, note_to_frequency(note), 0.0);
        self.gain.automate(time, CurveType::Hold, 0.0, 0.0);
        self.gain
            .automate(time, CurveType::Target, velocity, self.attack);
    }

    fn stop(&mut self, time: f64) {
        let Some(start) = self.playable.start_time() else {
            // Logged by the playable
            let _ = self.playable.stop(time);
            return;
        };

        let time = time.max(start);
        let end = time + self.release * T60;
        if self.playable.stop(end).is_err() {
            return;
        }

        self.gain.automate(time, CurveType::Hold, 0.0, 0.0);
        self.gain
            .automate(time, CurveType::Target, 0.0, self.release);
        debug!("voice release at {:.3}s, idle at {:.3}s", time, end);
    }

    fn reset(&mut self) {
        if let Some(stop) = self.playable.stop_time() {
            self.gain.purge(stop);
            self.frequency.purge(stop);
        }
        self.playable.reset();
    }

    #[inline]
    fn start_time(&self) -> Option<f64> {
        self.playable.start_time()
    }

    #[inline]
    fn stop_time(&self) -> Option<f64> {
        self.playable.stop_time()
    }

    fn automate(&mut self, name: Name, time: f64, curve: CurveType, value: f64, duration: f64) -> bool {
        match name {
            Name::GAIN => self.gain.automate(time, curve, value, duration),
            Name::FREQUENCY => self.frequency.automate(time, curve, value, duration),
            Name::PITCH => self
                .frequency
                .automate(time, curve, note_to_frequency(value), duration),
            _ => return false,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParamCall;

    fn voice() -> Monophonic {
        Monophonic::new(RecordedParam::new(0.0), RecordedParam::new(440.0), 0.01, 0.1)
    }

    #[test]
    fn test_note_to_frequency() {
        assert_eq!(note_to_frequency(69.0), 440.0);
        assert!((note_to_frequency(81.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn test_start_attacks_towards_velocity() {
        let mut voice = voice();
        voice.start(1.0, 69.0, 0.8);

        assert_eq!(voice.frequency().value_at_time(1.0), 440.0);
        assert_eq!(voice.gain().value_at_time(1.0), 0.0);
        let later = voice.gain().value_at_time(1.1);
        assert!(later > 0.79 && later < 0.8);
        // Cued voices are not idle
        assert!(!voice.is_idle(0.5));
        assert!(!voice.is_idle(1.0));
    }

    #[test]
    fn test_stop_releases_and_goes_idle() {
        let mut voice = voice();
        voice.start(0.0, 60.0, 1.0);
        voice.stop(1.0);

        let end = 1.0 + 0.1 * T60;
        assert_eq!(voice.stop_time(), Some(end));
        assert!(!voice.is_idle(1.5));
        assert!(voice.is_idle(end));

        let held = voice.gain().value_at_time(1.0);
        assert!(held > 0.99);
        assert!(voice.gain().value_at_time(end) < 0.001 * held + 1e-12);

        let calls = voice.gain().target().calls();
        assert!(matches!(
            calls.last(),
            Some(ParamCall::Target { value, time, .. }) if *value == 0.0 && *time == 1.0
        ));
    }

    #[test]
    fn test_double_start_is_ignored() {
        let mut voice = voice();
        voice.start(0.0, 60.0, 1.0);
        let calls = voice.gain().target().calls().len();
        voice.start(0.5, 62.0, 1.0);
        assert_eq!(voice.gain().target().calls().len(), calls);
        assert_eq!(voice.start_time(), Some(0.0));
    }

    #[test]
    fn test_reset_clears_lifecycle() {
        let mut voice = voice();
        voice.start(0.0, 60.0, 1.0);
        voice.stop(0.5);
        voice.reset();
        assert_eq!(voice.start_time(), None);
        assert!(voice.is_idle(0.0));
    }

    #[test]
    fn test_automate_by_name() {
        let mut voice = voice();
        assert!(voice.automate(Name::PITCH, 0.0, CurveType::Set, 81.0, 0.0));
        assert!((voice.frequency().value_at_time(0.0) - 880.0).abs() < 1e-9);
        assert!(!voice.automate(Name::CUTOFF, 0.0, CurveType::Set, 1.0, 0.0));
    }
}
