// src/polyphonic.rs

use std::sync::Arc;

use crate::address::{CurveType, Name};
use crate::clock::Clock;
use crate::distributor::LocalTarget;
use crate::voice::Voice;
use crate::voice_allocator::{VoiceFactory, VoicePool};

/// Polyphonic controller: plays notes on a pool of voices.
///
/// Owns its voice pool. The clock supplies the current time used to decide
/// which voices are idle.
pub struct Polyphonic<V: Voice> {
    pool: VoicePool<V>,
    clock: Arc<dyn Clock>,
}

impl<V: Voice> Polyphonic<V> {
    pub fn new(clock: Arc<dyn Clock>, factory: VoiceFactory<V>) -> Self {
        Self {
            pool: VoicePool::new(factory),
            clock,
        }
    }

    #[inline]
    pub fn pool(&self) -> &VoicePool<V> {
        &self.pool
    }

    #[inline]
    fn now(&self) -> f64 {
        self.clock.current_time()
    }

    /// Replace the voice template. Sounding voices finish and are retired.
    pub fn set_template(&mut self, factory: VoiceFactory<V>) {
        let now = self.now();
        self.pool.set_template(now, factory);
    }

    /// Release every sounding note at `time`.
    pub fn stop_all(&mut self, time: f64) -> usize {
        self.pool.stop_all(time)
    }
}

impl<V: Voice> LocalTarget for Polyphonic<V> {
    fn start(&mut self, time: f64, note: f64, velocity: f64) {
        let now = self.now();
        self.pool.start(now, time, note, velocity);
    }

    fn stop(&mut self, time: f64, note: f64) {
        self.pool.stop(time, note);
    }

    /// Automation applies to every voice currently in the pool.
    fn automate(&mut self, name: Name, time: f64, curve: CurveType, value: f64, duration: f64) -> bool {
        let mut accepted = false;
        self.pool.for_each_voice(|voice| {
            accepted |= voice.automate(name, time, curve, value, duration);
        });
        accepted
    }
}
