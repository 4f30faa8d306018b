// src/event_buffer.rs

use thiserror::Error;

use crate::address::Address;
use crate::event::Event;

/// Error raised by buffer operations that would break capacity or ordering.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BufferError {
    #[error("event buffer full: {needed} events needed, {available} free")]
    Full { needed: usize, available: usize },

    #[error("event time {time} is before last event time {last}")]
    TimeRegression { time: f64, last: f64 },

    #[error("inserted events are not in time order at index {index}")]
    Unordered { index: usize },

    #[error("event time {time} is not a finite number")]
    NonFiniteTime { time: f64 },
}

/// Fixed-capacity, time-ordered sequence of events.
///
/// Invariants:
/// - `len() <= capacity()`
/// - event times are non-decreasing
///
/// Storage is allocated once on construction. Operations that would break
/// either invariant fail without modifying the buffer.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: Vec<Event>,
    capacity: usize,
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Build a buffer from already ordered events.
    pub fn from_events(events: &[Event], capacity: usize) -> Result<Self, BufferError> {
        let mut buffer = Self::with_capacity(capacity);
        buffer.insert(events)?;
        Ok(buffer)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.events.len()
    }

    /// Time of the last event, if any.
    #[inline]
    pub fn last_time(&self) -> Option<f64> {
        self.events.last().map(|e| e.time)
    }

    /// Append an event at the end.
    ///
    /// Fails if the buffer is full or if `time` is before the last event.
    pub fn push(
        &mut self,
        time: f64,
        address: Address,
        value1: f64,
        value2: f64,
    ) -> Result<(), BufferError> {
        self.push_event(Event::new(time, address, value1, value2))
    }

    pub fn push_event(&mut self, event: Event) -> Result<(), BufferError> {
        if !event.time.is_finite() {
            return Err(BufferError::NonFiniteTime { time: event.time });
        }

        if self.remaining() == 0 {
            return Err(BufferError::Full {
                needed: 1,
                available: 0,
            });
        }

        if let Some(last) = self.last_time() {
            if event.time < last {
                return Err(BufferError::TimeRegression {
                    time: event.time,
                    last,
                });
            }
        }

        self.events.push(event);
        Ok(())
    }

    /// Merge a time-ordered batch into the buffer, preserving global order.
    ///
    /// Inserted events land after existing events with the same time.
    pub fn insert(&mut self, events: &[Event]) -> Result<(), BufferError> {
        if events.len() > self.remaining() {
            return Err(BufferError::Full {
                needed: events.len(),
                available: self.remaining(),
            });
        }

        if let Some(event) = events.iter().find(|e| !e.time.is_finite()) {
            return Err(BufferError::NonFiniteTime { time: event.time });
        }

        if let Some(index) = events.windows(2).position(|w| w[1].time < w[0].time) {
            return Err(BufferError::Unordered { index: index + 1 });
        }

        // Walk back from the end; the batch is ordered so the search point
        // only ever moves towards the front.
        let mut end = self.events.len();
        let mut positions = Vec::with_capacity(events.len());
        for event in events.iter().rev() {
            while end > 0 && self.events[end - 1].time > event.time {
                end -= 1;
            }
            positions.push(end);
        }

        for (event, position) in events.iter().zip(positions.into_iter().rev()).rev() {
            self.events.insert(position, *event);
        }

        Ok(())
    }

    /// Zero-copy view over events `start..end`.
    ///
    /// The borrow keeps the buffer unmodified for as long as the view lives.
    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &[Event] {
        &self.events[start..end]
    }

    /// Discard all events from index `len` onwards.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[inline]
    pub fn event_at(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    #[inline]
    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Index of the first event at or after `time`.
    pub fn index_at(&self, time: f64) -> usize {
        self.events.partition_point(|e| e.time < time)
    }
}

impl<'a> IntoIterator for &'a EventBuffer {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{CurveType, Name};

    fn gain(time: f64, value: f64) -> Event {
        Event::local(time, Name::GAIN, CurveType::Set, value, 0.0)
    }

    fn times(buffer: &EventBuffer) -> Vec<f64> {
        buffer.iter().map(|e| e.time).collect()
    }

    #[test]
    fn test_push_in_order() {
        let mut buffer = EventBuffer::with_capacity(4);
        let address = Address::local(Name::GAIN, CurveType::Set);
        buffer.push(0.0, address, 0.0, 0.0).unwrap();
        buffer.push(1.0, address, 1.0, 0.0).unwrap();
        buffer.push(1.0, address, 2.0, 0.0).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.last_time(), Some(1.0));
    }

    #[test]
    fn test_push_rejects_time_regression() {
        let mut buffer = EventBuffer::with_capacity(4);
        buffer.push_event(gain(2.0, 0.0)).unwrap();
        assert_eq!(
            buffer.push_event(gain(1.0, 0.0)),
            Err(BufferError::TimeRegression { time: 1.0, last: 2.0 })
        );
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_rejects_non_finite_times() {
        let mut buffer = EventBuffer::with_capacity(4);
        buffer.push_event(gain(2.0, 0.0)).unwrap();
        assert!(matches!(
            buffer.push_event(gain(f64::NAN, 0.0)),
            Err(BufferError::NonFiniteTime { .. })
        ));
        assert!(matches!(
            buffer.push_event(gain(f64::INFINITY, 0.0)),
            Err(BufferError::NonFiniteTime { .. })
        ));
        assert_eq!(
            buffer.push_event(gain(1.0, 0.0)),
            Err(BufferError::TimeRegression { time: 1.0, last: 2.0 })
        );

        assert!(matches!(
            buffer.insert(&[gain(3.0, 0.0), gain(f64::NAN, 0.0)]),
            Err(BufferError::NonFiniteTime { .. })
        ));
        assert_eq!(times(&buffer), vec![2.0]);
    }

    #[test]
    fn test_push_rejects_when_full() {
        let mut buffer = EventBuffer::with_capacity(1);
        buffer.push_event(gain(0.0, 0.0)).unwrap();
        assert!(matches!(
            buffer.push_event(gain(1.0, 0.0)),
            Err(BufferError::Full { .. })
        ));
    }

    #[test]
    fn test_insert_merges_in_order() {
        let mut buffer = EventBuffer::from_events(&[gain(0.0, 0.0), gain(2.0, 0.0), gain(4.0, 0.0)], 8).unwrap();
        buffer
            .insert(&[gain(1.0, 1.0), gain(2.0, 1.0), gain(5.0, 1.0)])
            .unwrap();
        assert_eq!(times(&buffer), vec![0.0, 1.0, 2.0, 2.0, 4.0, 5.0]);
        // Equal times keep existing events first
        assert_eq!(buffer.event_at(2).unwrap().value1, 0.0);
        assert_eq!(buffer.event_at(3).unwrap().value1, 1.0);
    }

    #[test]
    fn test_insert_before_everything() {
        let mut buffer = EventBuffer::from_events(&[gain(3.0, 0.0)], 4).unwrap();
        buffer.insert(&[gain(0.0, 0.0), gain(1.0, 0.0)]).unwrap();
        assert_eq!(times(&buffer), vec![0.0, 1.0, 3.0]);
    }

    #[test]
    fn test_insert_rejects_overflow_untouched() {
        let mut buffer = EventBuffer::from_events(&[gain(0.0, 0.0)], 2).unwrap();
        let result = buffer.insert(&[gain(1.0, 0.0), gain(2.0, 0.0)]);
        assert_eq!(result, Err(BufferError::Full { needed: 2, available: 1 }));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_insert_rejects_unordered_batch() {
        let mut buffer = EventBuffer::with_capacity(4);
        let result = buffer.insert(&[gain(1.0, 0.0), gain(0.5, 0.0)]);
        assert_eq!(result, Err(BufferError::Unordered { index: 1 }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_slice_and_truncate() {
        let mut buffer = EventBuffer::from_events(&[gain(0.0, 0.0), gain(1.0, 1.0), gain(2.0, 2.0)], 4).unwrap();
        let view = buffer.slice(1, 3);
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].value1, 1.0);

        buffer.truncate(1);
        assert_eq!(times(&buffer), vec![0.0]);
    }

    #[test]
    fn test_index_at() {
        let buffer = EventBuffer::from_events(&[gain(0.0, 0.0), gain(1.0, 1.0), gain(1.0, 2.0), gain(3.0, 3.0)], 4).unwrap();
        assert_eq!(buffer.index_at(1.0), 1);
        assert_eq!(buffer.index_at(2.0), 3);
        assert_eq!(buffer.index_at(9.0), 4);
    }
}
