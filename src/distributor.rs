// src/distributor.rs
//
// Hierarchical event routing.
//
// A distributor receives ordered event buffers. Events with a local route
// are dispatched by name to its own target; the rest are re-addressed (the
// leading route segment stripped) and forwarded to the child registered at
// that segment. Children are sinks themselves, so distributors nest.
//
// One bad event never stops delivery of the rest of the buffer. A
// distributor given a clock moves events that arrive already late up to the
// clock's current time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::address::{AddressError, CurveType, MAX_SEGMENT, Name};
use crate::clock::Clock;
use crate::event::Event;

/// Receiver of ordered event batches.
pub trait EventSink {
    fn push(&mut self, events: &[Event]);
}

impl EventSink for Vec<Event> {
    fn push(&mut self, events: &[Event]) {
        self.extend_from_slice(events);
    }
}

/// Shared sink, e.g. one fed from the timer thread and inspected elsewhere.
impl<S: EventSink + ?Sized> EventSink for Arc<Mutex<S>> {
    fn push(&mut self, events: &[Event]) {
        match self.lock() {
            Ok(mut sink) => sink.push(events),
            Err(poisoned) => poisoned.into_inner().push(events),
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn push(&mut self, events: &[Event]) {
        (**self).push(events);
    }
}

/// Object receiving locally addressed events.
pub trait LocalTarget {
    fn start(&mut self, time: f64, note: f64, velocity: f64);

    fn stop(&mut self, time: f64, note: f64);

    /// Returns false if this target does not record.
    fn record(&mut self, _time: f64, _value: f64) -> bool {
        false
    }

    /// Automate the control target called `name`.
    ///
    /// Returns false if there is no such target.
    fn automate(&mut self, name: Name, time: f64, curve: CurveType, value: f64, duration: f64) -> bool;

    /// Set the plain property called `name`.
    ///
    /// Returns false if there is no such property.
    fn set_property(&mut self, _name: Name, _time: f64, _value: f64) -> bool {
        false
    }
}

pub type BoxedTarget = Box<dyn LocalTarget + Send>;
pub type BoxedSink = Box<dyn EventSink + Send>;

/// Velocity of notes started by a `note` event.
pub const NOTE_VELOCITY: f64 = 1.0;

/// Dispatch a locally addressed event to `target` by name.
///
/// A `note` event carries the note number in `value1` and its duration in
/// `value2`; it starts the note and stops it `duration` seconds later.
pub fn dispatch_local(target: &mut dyn LocalTarget, event: &Event) {
    let name = event.name();
    let curve = event.curve();

    match name {
        Name::START | Name::STOP | Name::NOTE | Name::RECORD if curve != CurveType::Set => {
            warn!("dropping {} event with curve {} at {:.3}", name, curve, event.time);
        }
        Name::START => target.start(event.time, event.value1, event.value2),
        Name::STOP => target.stop(event.time, event.value1),
        Name::NOTE => {
            target.start(event.time, event.value1, NOTE_VELOCITY);
            target.stop(event.time + event.value2.max(0.0), event.value1);
        }
        Name::RECORD => {
            if !target.record(event.time, event.value1) {
                warn!("dropping record event at {:.3}: target does not record", event.time);
            }
        }
        _ => {
            if target.automate(name, event.time, curve, event.value1, event.value2) {
                return;
            }
            if curve != CurveType::Set {
                warn!(
                    "dropping {} event on {} at {:.3}: only set events may target plain properties",
                    curve, name, event.time
                );
                return;
            }
            if !target.set_property(name, event.time, event.value1) {
                warn!("dropping event at {:.3}: no target named {}", event.time, name);
            }
        }
    }
}

struct Child {
    sink: BoxedSink,
    /// Events queued for this child during one distribute call
    pending: Vec<Event>,
}

/// Router over a local target and numbered children.
pub struct Distributor {
    local: Option<BoxedTarget>,
    children: BTreeMap<u16, Child>,
    clock: Option<Arc<dyn Clock>>,
}

impl Distributor {
    pub fn new(local: BoxedTarget) -> Self {
        Self {
            local: Some(local),
            children: BTreeMap::new(),
            clock: None,
        }
    }

    /// A distributor with children only.
    pub fn router() -> Self {
        Self {
            local: None,
            children: BTreeMap::new(),
            clock: None,
        }
    }

    /// Clamp late events to `clock`'s current time before routing them.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register `sink` at route segment `index`, returning any sink it replaces.
    pub fn register(&mut self, index: u16, sink: BoxedSink) -> Result<Option<BoxedSink>, AddressError> {
        if index == 0 || index > MAX_SEGMENT {
            return Err(AddressError::InvalidSegment {
                hop: 0,
                segment: index,
            });
        }

        let child = Child {
            sink,
            pending: Vec::new(),
        };
        Ok(self.children.insert(index, child).map(|old| old.sink))
    }

    pub fn unregister(&mut self, index: u16) -> Option<BoxedSink> {
        self.children.remove(&index).map(|child| child.sink)
    }

    #[inline]
    pub fn has_child(&self, index: u16) -> bool {
        self.children.contains_key(&index)
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Route an ordered batch of events.
    ///
    /// Each child receives its events as one ordered batch after the whole
    /// input has been walked.
    pub fn distribute(&mut self, events: &[Event]) {
        let now = self.clock.as_ref().map(|clock| clock.current_time());

        for event in events {
            let event = &match now {
                Some(now) if event.time < now => {
                    warn!(
                        "late event {}: due at {:.3}, clock at {:.3}, using current time",
                        event, event.time, now
                    );
                    Event { time: now, ..*event }
                }
                _ => *event,
            };

            match event.address.next_hop() {
                None => match self.local.as_deref_mut() {
                    Some(target) => dispatch_local(target, event),
                    None => warn!("dropping local event {}: no local target", event),
                },
                Some((index, address)) => match self.children.get_mut(&index) {
                    Some(child) => child.pending.push(event.readdressed(address)),
                    None => warn!("dropping event {}: no child at route {}", event, index),
                },
            }
        }

        for (index, child) in &mut self.children {
            if child.pending.is_empty() {
                continue;
            }
            debug!("forwarding {} events to child {}", child.pending.len(), index);
            child.sink.push(&child.pending);
            child.pending.clear();
        }
    }
}

impl EventSink for Distributor {
    fn push(&mut self, events: &[Event]) {
        self.distribute(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::clock::ManualClock;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start(f64, f64, f64),
        Stop(f64, f64),
        Automate(Name, f64, CurveType, f64),
        Property(Name, f64),
    }

    /// Records calls into a shared log.
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl LocalTarget for Recorder {
        fn start(&mut self, time: f64, note: f64, velocity: f64) {
            self.calls.lock().unwrap().push(Call::Start(time, note, velocity));
        }

        fn stop(&mut self, time: f64, note: f64) {
            self.calls.lock().unwrap().push(Call::Stop(time, note));
        }

        fn automate(&mut self, name: Name, time: f64, curve: CurveType, value: f64, _duration: f64) -> bool {
            if name != Name::GAIN {
                return false;
            }
            self.calls.lock().unwrap().push(Call::Automate(name, time, curve, value));
            true
        }

        fn set_property(&mut self, name: Name, _time: f64, value: f64) -> bool {
            if name != Name::TYPE {
                return false;
            }
            self.calls.lock().unwrap().push(Call::Property(name, value));
            true
        }
    }

    fn recorder() -> (BoxedTarget, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (Box::new(Recorder { calls: calls.clone() }), calls)
    }

    fn routed(time: f64, route: &[u16], name: Name, curve: CurveType, value: f64) -> Event {
        Event::new(time, Address::encode(route, name, curve).unwrap(), value, 0.0)
    }

    #[test]
    fn test_local_route_dispatches_locally() {
        let (target, calls) = recorder();
        let mut distributor = Distributor::new(target);

        distributor.distribute(&[
            routed(0.0, &[], Name::START, CurveType::Set, 60.0),
            routed(0.5, &[], Name::GAIN, CurveType::Linear, 0.5),
            routed(1.0, &[], Name::STOP, CurveType::Set, 60.0),
        ]);

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Start(0.0, 60.0, 0.0),
                Call::Automate(Name::GAIN, 0.5, CurveType::Linear, 0.5),
                Call::Stop(1.0, 60.0),
            ]
        );
    }

    #[test]
    fn test_single_hop_strips_route() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut distributor = Distributor::router();
        distributor.register(2, Box::new(sink.clone())).unwrap();

        distributor.distribute(&[routed(1.0, &[2], Name::GAIN, CurveType::Target, 0.3)]);

        let received = sink.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].address.is_local());
        assert_eq!(received[0].name(), Name::GAIN);
        assert_eq!(received[0].curve(), CurveType::Target);
    }

    #[test]
    fn test_nested_route_reaches_grandchild() {
        let (target, calls) = recorder();
        let mut inner = Distributor::router();
        inner.register(2, Box::new(Distributor::new(target))).unwrap();

        let mut outer = Distributor::router();
        outer.register(1, Box::new(inner)).unwrap();

        outer.distribute(&[routed(2.0, &[1, 2], Name::GAIN, CurveType::Set, 0.8)]);

        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::Automate(Name::GAIN, 2.0, CurveType::Set, 0.8)]
        );
    }

    #[test]
    fn test_bad_events_do_not_stop_delivery() {
        let (target, calls) = recorder();
        let mut distributor = Distributor::new(target);

        distributor.distribute(&[
            routed(0.0, &[7], Name::GAIN, CurveType::Set, 1.0),
            routed(0.1, &[], Name::TYPE, CurveType::Linear, 2.0),
            routed(0.2, &[], Name::CUTOFF, CurveType::Set, 3.0),
            routed(0.3, &[], Name::START, CurveType::Target, 60.0),
            routed(0.4, &[], Name::TYPE, CurveType::Set, 2.0),
        ]);

        assert_eq!(*calls.lock().unwrap(), vec![Call::Property(Name::TYPE, 2.0)]);
    }

    #[test]
    fn test_children_receive_ordered_batches() {
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        let mut distributor = Distributor::router();
        distributor.register(1, Box::new(a.clone())).unwrap();
        distributor.register(2, Box::new(b.clone())).unwrap();

        distributor.distribute(&[
            routed(0.0, &[1], Name::GAIN, CurveType::Set, 0.0),
            routed(1.0, &[2], Name::GAIN, CurveType::Set, 1.0),
            routed(2.0, &[1], Name::GAIN, CurveType::Set, 2.0),
        ]);

        let times: Vec<f64> = a.lock().unwrap().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.0, 2.0]);
        assert_eq!(b.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_register_rejects_local_index() {
        let mut distributor = Distributor::router();
        assert!(distributor.register(0, Box::new(Vec::new())).is_err());
        assert!(distributor.register(1024, Box::new(Vec::new())).is_err());
        assert!(distributor.register(3, Box::new(Vec::new())).unwrap().is_none());
        assert!(distributor.has_child(3));
    }

    #[test]
    fn test_note_starts_and_stops_after_duration() {
        let (target, calls) = recorder();
        let mut distributor = Distributor::new(target);

        let note = Event::new(
            1.0,
            Address::encode(&[], Name::NOTE, CurveType::Set).unwrap(),
            62.0,
            0.5,
        );
        let bent = routed(2.0, &[], Name::NOTE, CurveType::Linear, 64.0);
        distributor.distribute(&[note, bent]);

        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::Start(1.0, 62.0, NOTE_VELOCITY), Call::Stop(1.5, 62.0)]
        );
    }

    #[test]
    fn test_late_events_use_current_time() {
        let (target, calls) = recorder();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let clock = Arc::new(ManualClock::new(2.0));

        let mut distributor = Distributor::new(target).with_clock(clock.clone());
        distributor.register(1, Box::new(sink.clone())).unwrap();

        distributor.distribute(&[
            routed(1.5, &[], Name::GAIN, CurveType::Set, 0.5),
            routed(1.9, &[1], Name::GAIN, CurveType::Set, 0.7),
            routed(3.0, &[], Name::GAIN, CurveType::Set, 0.9),
        ]);

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                Call::Automate(Name::GAIN, 2.0, CurveType::Set, 0.5),
                Call::Automate(Name::GAIN, 3.0, CurveType::Set, 0.9),
            ]
        );
        let forwarded: Vec<f64> = sink.lock().unwrap().iter().map(|e| e.time).collect();
        assert_eq!(forwarded, vec![2.0]);

        // Without a clock times pass through untouched
        let (target, calls) = recorder();
        let mut distributor = Distributor::new(target);
        distributor.distribute(&[routed(1.5, &[], Name::GAIN, CurveType::Set, 0.5)]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::Automate(Name::GAIN, 1.5, CurveType::Set, 0.5)]
        );
    }
}
