// src/meter.rs
//
// Meter map: bar <-> beat conversion.
//
// Meter regions are keyed by beat and are independent of tempo. Whole bars
// are accumulated per region; a region boundary that falls mid-bar starts a
// fresh bar.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeterError {
    #[error("beats per bar must be positive, got {0}")]
    InvalidBar(f64),

    #[error("meter beat must be a non-negative number, got {0}")]
    InvalidBeat(f64),
}

/// One meter region.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeterEntry {
    /// Beat at which the region begins
    pub beat: f64,
    /// Beats per bar
    pub bar: f64,
    /// Beat division (the denominator, in beats)
    pub division: f64,
}

impl MeterEntry {
    pub const DEFAULT: MeterEntry = MeterEntry {
        beat: 0.0,
        bar: 4.0,
        division: 1.0,
    };
}

/// Ordered list of meter regions, always starting with one at beat 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Meter {
    entries: Vec<MeterEntry>,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            entries: vec![MeterEntry::DEFAULT],
        }
    }
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn entries(&self) -> &[MeterEntry] {
        &self.entries
    }

    /// Start a new region at `beat`, replacing only a region at that same beat.
    pub fn set_at_beat(&mut self, beat: f64, bar: f64, division: f64) -> Result<(), MeterError> {
        if !(bar > 0.0 && bar.is_finite()) {
            return Err(MeterError::InvalidBar(bar));
        }
        if !(beat >= 0.0 && beat.is_finite()) {
            return Err(MeterError::InvalidBeat(beat));
        }

        let entry = MeterEntry {
            beat,
            bar,
            division,
        };
        let n = self.entries.partition_point(|e| e.beat < beat);
        match self.entries.get_mut(n) {
            Some(existing) if existing.beat == beat => *existing = entry,
            _ => self.entries.insert(n, entry),
        }
        Ok(())
    }

    /// Region in effect at `beat`.
    pub fn at_beat(&self, beat: f64) -> MeterEntry {
        let n = self.entries.partition_point(|e| e.beat <= beat);
        self.entries[n.saturating_sub(1)]
    }

    /// Bar position of `beat`, fractional within the bar.
    ///
    /// A bar cut short by the next region still counts as a whole bar.
    pub fn bar_at_beat(&self, beat: f64) -> f64 {
        let mut bars = 0.0;
        let mut region = self.entries[0];

        for entry in &self.entries[1..] {
            if entry.beat > beat {
                break;
            }
            bars += ((entry.beat - region.beat) / region.bar).ceil();
            region = *entry;
        }

        bars + (beat - region.beat) / region.bar
    }

    /// Beat at which bar position `bar` falls.
    ///
    /// Positions inside the unplayed tail of a cut-short bar map to the
    /// start of the next region.
    pub fn beat_at_bar(&self, bar: f64) -> f64 {
        let mut bars = 0.0;
        let mut i = 0;

        loop {
            let region = self.entries[i];
            let beat = region.beat + (bar - bars) * region.bar;
            let Some(next) = self.entries.get(i + 1) else {
                return beat;
            };
            if beat < next.beat {
                return beat;
            }

            let region_bars = ((next.beat - region.beat) / region.bar).ceil();
            if bar < bars + region_bars {
                return next.beat;
            }
            bars += region_bars;
            i += 1;
        }
    }
}
