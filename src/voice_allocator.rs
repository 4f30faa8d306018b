// src/voice_allocator.rs

use log::debug;

use crate::voice::Voice;

/// Builds fresh voices from the current template.
pub type VoiceFactory<V> = Box<dyn Fn() -> V + Send>;

struct Slot<V> {
    voice: V,
    /// Note this voice is sounding, cleared as soon as it is stopped
    note: Option<f64>,
    /// Built from a replaced template; evicted instead of reused once idle
    end_of_life: bool,
}

/// Recycling allocator over monophonic voices.
///
/// Responsibilities:
/// - map notes to voices
/// - reuse idle voices before creating new ones
/// - retire voices built from a replaced template
///
/// Voices are created lazily, so the pool only grows to the number of
/// simultaneously sounding notes.
pub struct VoicePool<V: Voice> {
    slots: Vec<Slot<V>>,
    factory: VoiceFactory<V>,
}

impl<V: Voice> VoicePool<V> {
    pub fn new(factory: VoiceFactory<V>) -> Self {
        Self {
            slots: Vec::new(),
            factory,
        }
    }

    /// Number of voices in the pool, sounding or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of voices not idle at `now`.
    pub fn active_count(&self, now: f64) -> usize {
        self.slots.iter().filter(|s| !s.voice.is_idle(now)).count()
    }

    pub fn voices(&self) -> impl Iterator<Item = &V> + '_ {
        self.slots.iter().map(|s| &s.voice)
    }

    /// Note currently assigned to slot `index`.
    pub fn note_at(&self, index: usize) -> Option<f64> {
        self.slots.get(index).and_then(|s| s.note)
    }

    /// Start `note` on an idle voice, or on a new one.
    ///
    /// `now` is the current transport time used for the idle test.
    /// Returns the slot index used.
    pub fn start(&mut self, now: f64, time: f64, note: f64, velocity: f64) -> usize {
        self.slots
            .retain(|slot| !(slot.end_of_life && slot.voice.is_idle(now)));

        let index = match self.slots.iter().position(|s| s.voice.is_idle(now)) {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.voice.reset();
                index
            }
            None => {
                self.slots.push(Slot {
                    voice: (self.factory)(),
                    note: None,
                    end_of_life: false,
                });
                debug!("voice pool grew to {}", self.slots.len());
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        slot.note = Some(note);
        slot.voice.start(time, note, velocity);
        index
    }

    /// Stop the voice sounding `note` at `time`.
    ///
    /// Returns false if no voice matched. Unmatched stops are harmless.
    pub fn stop(&mut self, time: f64, note: f64) -> bool {
        let matched = self.slots.iter_mut().find(|slot| {
            slot.note == Some(note)
                && slot.voice.start_time().is_some()
                && slot.voice.stop_time().is_none_or(|stop| stop > time)
        });

        let Some(slot) = matched else {
            debug!("stop {} at {:.3}s matched no sounding voice", note, time);
            return false;
        };

        slot.voice.stop(time);
        slot.note = None;
        true
    }

    /// Stop every sounding voice at `time`.
    pub fn stop_all(&mut self, time: f64) -> usize {
        let mut count = 0;
        for slot in &mut self.slots {
            if slot.note.take().is_some() {
                slot.voice.stop(time);
                count += 1;
            }
        }
        count
    }

    /// Replace the template. Idle voices are dropped; sounding voices
    /// finish their release and are evicted once idle.
    pub fn set_template(&mut self, now: f64, factory: VoiceFactory<V>) {
        self.factory = factory;
        self.slots.retain(|slot| !slot.voice.is_idle(now));
        for slot in &mut self.slots {
            slot.end_of_life = true;
        }
        debug!("voice template replaced, {} voices retiring", self.slots.len());
    }

    /// Apply `f` to every voice.
    pub fn for_each_voice(&mut self, mut f: impl FnMut(&mut V)) {
        for slot in &mut self.slots {
            f(&mut slot.voice);
        }
    }
}
