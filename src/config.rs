// src/config.rs

/// Engine-wide defaults.
///
/// All times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// How far ahead of now the scheduler dispatches
    pub lookahead: f64,

    /// Length of the window dispatched on each tick
    pub frame_duration: f64,

    /// Capacity of the event buffer dispatched per tick
    pub buffer_capacity: usize,

    /// Initial tempo in beats per second
    pub default_rate: f64,

    /// Voice release time constant
    pub release: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead: 0.12,
            frame_duration: 0.24,
            buffer_capacity: 256,
            default_rate: 2.0,
            release: 0.2,
        }
    }
}

impl EngineConfig {
    /// Span of each scheduling window.
    #[inline]
    pub fn window(&self) -> f64 {
        self.lookahead + self.frame_duration
    }

    /// Initial tempo in beats per minute.
    #[inline]
    pub fn default_bpm(&self) -> f64 {
        self.default_rate * 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_bpm(), 120.0);
        assert!((config.window() - 0.36).abs() < 1e-12);
    }
}
