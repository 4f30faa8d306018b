// src/transport.rs
//
// Musical time.
//
// Converts between wall-clock time, beats and bars under a changing tempo.
// Tempo is an automation list of rates (beats per second) keyed by time;
// meter is a list of regions keyed by beat.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::address::CurveType;
use crate::automation::AutomationList;
use crate::config::EngineConfig;
use crate::location::{beats_in_segment, time_in_segment};
use crate::meter::{Meter, MeterEntry, MeterError};
use crate::playable::{PlayableError, PlaybackStatus, Playable};

//
// ===============================
// MARK: Beat cache
// ===============================
//

/// Memoised beat count at each tempo anchor.
///
/// Keys are anchor times as f64 bits. Times are never negative, so bit
/// order is numeric order and a range split drops everything at or after a
/// given time.
#[derive(Debug, Clone, Default)]
pub struct BeatCache {
    anchors: BTreeMap<u64, f64>,
}

impl BeatCache {
    #[inline]
    fn key(time: f64) -> u64 {
        time.max(0.0).to_bits()
    }

    #[inline]
    pub fn get(&self, time: f64) -> Option<f64> {
        self.anchors.get(&Self::key(time)).copied()
    }

    #[inline]
    pub fn insert(&mut self, time: f64, beat: f64) {
        self.anchors.insert(Self::key(time), beat);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Drop every anchor at or after `time`.
    pub fn invalidate_from(&mut self, time: f64) {
        self.anchors.split_off(&Self::key(time));
    }

    /// Drop every anchor before `time`.
    pub fn retain_from(&mut self, time: f64) {
        self.anchors = self.anchors.split_off(&Self::key(time));
    }

    pub fn clear(&mut self) {
        self.anchors.clear();
    }

    /// Beat count at tempo entry `j`.
    ///
    /// Walks back to the nearest cached anchor (or the first entry, which
    /// sits at `base`), then forward to `j`, caching each anchor on the way.
    /// The walk is bounded by the number of tempo entries.
    pub fn anchor_beat(&mut self, tempo: &AutomationList, base: f64, j: usize) -> f64 {
        let events = tempo.events();

        let mut k = j;
        let mut beat = loop {
            if let Some(beat) = self.get(events[k].time) {
                break beat;
            }
            if k == 0 {
                self.insert(events[0].time, base);
                break base;
            }
            k -= 1;
        };

        while k < j {
            beat += beats_in_segment(tempo, k, events[k + 1].time);
            k += 1;
            self.insert(events[k].time, beat);
        }

        beat
    }
}

//
// ===============================
// MARK: Transport
// ===============================
//

/// Tempo and meter state of one timeline.
///
/// This struct:
/// - owns the tempo list, the meter list and the beat cache
/// - counts beats from its start time, at its start location
/// - clamps negative times to 0
///
/// Queries take `&mut self` because they fill the cache.
#[derive(Debug, Clone)]
pub struct Transport {
    tempo: AutomationList,
    meter: Meter,
    cache: BeatCache,

    /// Beat count at the first tempo entry
    base_beat: f64,

    playable: Playable,

    /// Beat at the start time
    start_location: f64,

    /// Absolute beat count at the start time
    origin_beat: Option<f64>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(EngineConfig::default().default_rate)
    }
}

impl Transport {
    /// A transport at a constant `rate` in beats per second.
    pub fn new(rate: f64) -> Self {
        Self {
            tempo: AutomationList::new(rate),
            meter: Meter::new(),
            cache: BeatCache::default(),
            base_beat: 0.0,
            playable: Playable::new(),
            start_location: 0.0,
            origin_beat: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.default_rate)
    }

    fn clamp_time(time: f64, what: &str) -> f64 {
        if time >= 0.0 {
            return time;
        }
        warn!("{} at negative time {} clamped to 0", what, time);
        0.0
    }

    // -------------------------------
    // MARK: Lifecycle
    // -------------------------------

    /// Start counting beats from `location` at `time`.
    pub fn start(&mut self, time: f64, location: f64) -> Result<(), PlayableError> {
        let time = Self::clamp_time(time, "transport start");
        self.playable.start(time)?;
        self.start_location = location;
        self.origin_beat = None;
        debug!("transport start at {:.3}s from beat {}", time, location);
        Ok(())
    }

    pub fn stop(&mut self, time: f64) -> Result<(), PlayableError> {
        let time = Self::clamp_time(time, "transport stop");
        self.playable.stop(time)?;
        debug!("transport stop at {:.3}s", time);
        Ok(())
    }

    #[inline]
    pub fn status(&self, now: f64) -> PlaybackStatus {
        self.playable.status(now)
    }

    /// Time beats are counted from. 0 until started.
    #[inline]
    pub fn start_time(&self) -> f64 {
        self.playable.start_time().unwrap_or(0.0)
    }

    #[inline]
    pub fn stop_time(&self) -> Option<f64> {
        self.playable.stop_time()
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.playable.start_time().is_some()
    }

    #[inline]
    pub fn start_location(&self) -> f64 {
        self.start_location
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn tempo(&self) -> &AutomationList {
        &self.tempo
    }

    #[inline]
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    #[inline]
    pub fn cache(&self) -> &BeatCache {
        &self.cache
    }

    // -------------------------------
    // MARK: Beat <-> time
    // -------------------------------

    /// Beats elapsed since the first tempo entry at `time`.
    fn absolute_beat(&mut self, time: f64) -> f64 {
        let Some(j) = self.tempo.index_at(time) else {
            let first = &self.tempo.events()[0];
            return self.base_beat - first.value * (first.time - time);
        };

        let anchor = self.cache.anchor_beat(&self.tempo, self.base_beat, j);
        anchor + beats_in_segment(&self.tempo, j, time)
    }

    /// Time at which the absolute beat count reaches `beat`.
    fn absolute_time(&mut self, beat: f64) -> f64 {
        let last = self.tempo.len() - 1;

        let mut j = 0;
        let mut anchor = self.cache.anchor_beat(&self.tempo, self.base_beat, 0);
        if beat < anchor {
            let first = &self.tempo.events()[0];
            return (first.time - (anchor - beat) / first.value).max(0.0);
        }

        while j < last {
            let next = self.cache.anchor_beat(&self.tempo, self.base_beat, j + 1);
            if next > beat {
                break;
            }
            j += 1;
            anchor = next;
        }

        self.tempo.events()[j].time + time_in_segment(&self.tempo, j, beat - anchor)
    }

    fn origin_beat(&mut self) -> f64 {
        if let Some(beat) = self.origin_beat {
            return beat;
        }
        let beat = self.absolute_beat(self.start_time());
        self.origin_beat = Some(beat);
        beat
    }

    /// Beat position at `time`.
    pub fn beat_at_time(&mut self, time: f64) -> f64 {
        let time = Self::clamp_time(time, "beat query");
        let origin = self.origin_beat();
        self.start_location + self.absolute_beat(time) - origin
    }

    /// Time at which beat position `beat` is reached.
    ///
    /// Returns `f64::INFINITY` if the tempo never gets there.
    pub fn time_at_beat(&mut self, beat: f64) -> f64 {
        let origin = self.origin_beat();
        self.absolute_time(origin + beat - self.start_location)
    }

    #[inline]
    pub fn bar_at_beat(&self, beat: f64) -> f64 {
        self.meter.bar_at_beat(beat)
    }

    #[inline]
    pub fn beat_at_bar(&self, bar: f64) -> f64 {
        self.meter.beat_at_bar(bar)
    }

    pub fn bar_at_time(&mut self, time: f64) -> f64 {
        let beat = self.beat_at_time(time);
        self.bar_at_beat(beat)
    }

    pub fn time_at_bar(&mut self, bar: f64) -> f64 {
        let beat = self.beat_at_bar(bar);
        self.time_at_beat(beat)
    }

    // -------------------------------
    // MARK: Tempo
    // -------------------------------

    /// Rate in beats per second at `time`.
    pub fn rate_at_time(&self, time: f64) -> f64 {
        self.tempo.value_at_time(time)
    }

    /// Tempo in beats per minute at `time`.
    pub fn tempo_at_time(&self, time: f64) -> f64 {
        self.rate_at_time(time) * 60.0
    }

    /// Schedule a rate change. Returns the time it is settled.
    pub fn set_rate_at_time(&mut self, time: f64, curve: CurveType, rate: f64, duration: f64) -> f64 {
        let time = Self::clamp_time(time, "rate change");

        if let Some(first) = self.tempo.events().first() {
            if time < first.time {
                warn!(
                    "rate change at {:.3}s rewrites purged tempo history before {:.3}s",
                    time, first.time
                );
            }
        }

        self.cache.invalidate_from(time);
        if time <= self.start_time() {
            self.origin_beat = None;
        }

        debug!("rate {} {} at {:.3}s", curve, rate, time);
        self.tempo.set_automation(time, curve, rate, duration)
    }

    /// Schedule a tempo change in beats per minute.
    pub fn set_tempo_at_time(&mut self, time: f64, curve: CurveType, bpm: f64, duration: f64) -> f64 {
        self.set_rate_at_time(time, curve, bpm / 60.0, duration)
    }

    // -------------------------------
    // MARK: Meter
    // -------------------------------

    pub fn set_meter_at_beat(&mut self, beat: f64, bar: f64, division: f64) -> Result<(), MeterError> {
        self.meter.set_at_beat(beat, bar, division)?;
        debug!("meter {}/{} at beat {}", bar, division, beat);
        Ok(())
    }

    #[inline]
    pub fn meter_at_beat(&self, beat: f64) -> MeterEntry {
        self.meter.at_beat(beat)
    }

    pub fn meter_at_time(&mut self, time: f64) -> MeterEntry {
        let beat = self.beat_at_time(time);
        self.meter.at_beat(beat)
    }

    // -------------------------------
    // MARK: History
    // -------------------------------

    /// Drop tempo history before `time`. Conversions at or after `time`
    /// are unchanged.
    pub fn purge(&mut self, time: f64) {
        let time = Self::clamp_time(time, "tempo purge");
        self.origin_beat();

        let Some(k) = self.tempo.index_at(time) else {
            return;
        };
        self.base_beat = self.cache.anchor_beat(&self.tempo, self.base_beat, k);
        self.tempo.purge(time);

        let first = self.tempo.events()[0].time;
        self.cache.retain_from(first);
        self.cache.insert(first, self.base_beat);
    }

    /// Forget every memoised anchor.
    pub fn purge_cache(&mut self) {
        self.cache.clear();
        self.cache.insert(self.tempo.events()[0].time, self.base_beat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_constant_rate() {
        let mut transport = Transport::new(2.0);
        assert_eq!(transport.beat_at_time(4.0), 8.0);
        assert_eq!(transport.time_at_beat(8.0), 4.0);
        assert_eq!(transport.tempo_at_time(1.0), 120.0);
    }

    #[test]
    fn test_step_tempo_change() {
        let mut transport = Transport::new(2.0);
        transport.set_rate_at_time(2.0, CurveType::Set, 4.0, 0.0);

        assert_eq!(transport.beat_at_time(2.0), 4.0);
        assert_eq!(transport.beat_at_time(3.0), 8.0);
        assert_eq!(transport.time_at_beat(8.0), 3.0);
        assert_eq!(transport.time_at_beat(2.0), 1.0);
    }

    #[test]
    fn test_linear_ramp_round_trip() {
        let mut transport = Transport::new(1.0);
        transport.set_rate_at_time(4.0, CurveType::Linear, 3.0, 0.0);

        // Average rate 2 over the ramp, then 3
        assert!(approx(transport.beat_at_time(4.0), 8.0));
        assert!(approx(transport.beat_at_time(5.0), 11.0));

        for time in [0.5, 1.0, 2.5, 3.9, 4.0, 6.0] {
            let beat = transport.beat_at_time(time);
            assert!(approx(transport.time_at_beat(beat), time), "round trip at {}", time);
        }
    }

    #[test]
    fn test_target_tempo_round_trip() {
        let mut transport = Transport::new(2.0);
        transport.set_rate_at_time(1.0, CurveType::Target, 1.0, 0.5);

        for time in [0.5, 1.0, 1.25, 2.0, 4.0] {
            let beat = transport.beat_at_time(time);
            assert!((transport.time_at_beat(beat) - time).abs() < 1e-6);
        }
        assert!(transport.beat_at_time(2.0) > 3.0);
        assert!(transport.beat_at_time(2.0) < 4.0);
    }

    #[test]
    fn test_cache_invalidated_by_tempo_change() {
        let mut transport = Transport::new(2.0);
        assert_eq!(transport.beat_at_time(10.0), 20.0);
        transport.set_rate_at_time(5.0, CurveType::Set, 1.0, 0.0);
        assert!(!transport.cache().is_empty());
        assert_eq!(transport.beat_at_time(10.0), 15.0);
    }

    #[test]
    fn test_start_offsets_beats() {
        let mut transport = Transport::new(2.0);
        transport.start(1.0, 4.0).unwrap();
        assert_eq!(transport.beat_at_time(1.0), 4.0);
        assert_eq!(transport.beat_at_time(2.0), 6.0);
        assert_eq!(transport.time_at_beat(8.0), 3.0);
        assert_eq!(transport.status(0.5), PlaybackStatus::Cued);

        transport.stop(3.0).unwrap();
        assert_eq!(transport.status(3.0), PlaybackStatus::Idle);
    }

    #[test]
    fn test_negative_time_clamps() {
        let mut transport = Transport::new(2.0);
        assert_eq!(transport.beat_at_time(-1.0), 0.0);
    }

    #[test]
    fn test_meter_through_transport() {
        let mut transport = Transport::new(2.0);
        transport.set_meter_at_beat(16.0, 3.0, 1.0).unwrap();
        assert!(approx(transport.bar_at_beat(20.0), 4.0 + 4.0 / 3.0));
        // Beat 20 at rate 2 is time 10
        assert!(approx(transport.bar_at_time(10.0), 4.0 + 4.0 / 3.0));
        assert_eq!(transport.meter_at_time(10.0).bar, 3.0);
        assert!(approx(transport.time_at_bar(4.0), 8.0));
    }

    #[test]
    fn test_purge_keeps_conversions() {
        let mut transport = Transport::new(2.0);
        transport.set_rate_at_time(2.0, CurveType::Set, 4.0, 0.0);
        transport.set_rate_at_time(4.0, CurveType::Linear, 1.0, 0.0);
        transport.set_rate_at_time(6.0, CurveType::Target, 3.0, 1.0);

        let times = [6.5, 7.0, 9.0];
        let before: Vec<f64> = times.iter().map(|&t| transport.beat_at_time(t)).collect();

        transport.purge(6.5);
        assert!(transport.tempo().len() <= 2);

        for (&time, &beat) in times.iter().zip(&before) {
            assert!(approx(transport.beat_at_time(time), beat));
            assert!((transport.time_at_beat(beat) - time).abs() < 1e-6);
        }
    }
}
