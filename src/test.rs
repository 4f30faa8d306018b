// src/test.rs
//
// End to end: parse a sequence, schedule it, route it and check what the
// targets ended up with.

use std::sync::{Arc, Mutex};

use crate::address::{CurveType, Name};
use crate::automation::T60;
use crate::clock::{Clock, ManualClock};
use crate::config::EngineConfig;
use crate::distributor::{Distributor, EventSink, LocalTarget};
use crate::event::Event;
use crate::nodes::ControlNode;
use crate::parse::parse_events;
use crate::polyphonic::Polyphonic;
use crate::scheduler::Scheduler;
use crate::voice::{Monophonic, Voice, note_to_frequency};

/// Target kept inspectable after it is handed to a distributor.
struct Shared<T>(Arc<Mutex<T>>);

impl<T: LocalTarget> LocalTarget for Shared<T> {
    fn start(&mut self, time: f64, note: f64, velocity: f64) {
        self.0.lock().unwrap().start(time, note, velocity);
    }

    fn stop(&mut self, time: f64, note: f64) {
        self.0.lock().unwrap().stop(time, note);
    }

    fn automate(&mut self, name: Name, time: f64, curve: CurveType, value: f64, duration: f64) -> bool {
        self.0
            .lock()
            .unwrap()
            .automate(name, time, curve, value, duration)
    }

    fn set_property(&mut self, name: Name, time: f64, value: f64) -> bool {
        self.0.lock().unwrap().set_property(name, time, value)
    }
}

/// Keeps a copy of everything dispatched.
struct Tee {
    log: Vec<Event>,
    inner: Distributor,
}

impl EventSink for Tee {
    fn push(&mut self, events: &[Event]) {
        self.log.extend_from_slice(events);
        self.inner.push(events);
    }
}

const SEQUENCE: &str = "
# beats, 120bpm until beat 4
0 1.start 60 1
0 2.gain 0
1 1.stop 60
2 2.gain 1 linear
2 1.start 64 0.5
4 rate 4
6 1.stop 64
";

fn run(scheduler: &mut Scheduler, clock: &ManualClock, sink: &mut dyn EventSink) {
    for _ in 0..1000 {
        if scheduler.is_finished() {
            break;
        }
        scheduler.tick(clock.current_time(), sink);
        clock.advance(0.1);
    }
}

#[test]
fn test_sequence_reaches_targets() {
    let config = EngineConfig::default();
    let clock = Arc::new(ManualClock::new(0.0));

    let instrument = Arc::new(Mutex::new(Polyphonic::new(
        clock.clone(),
        Box::new(move || Monophonic::recorded(&config)),
    )));
    let control = Arc::new(Mutex::new(ControlNode::new().with_param(Name::GAIN, 1.0)));

    let mut root = Distributor::router();
    root.register(1, Box::new(Distributor::new(Box::new(Shared(instrument.clone())))))
        .unwrap();
    root.register(2, Box::new(Distributor::new(Box::new(Shared(control.clone())))))
        .unwrap();
    let mut sink = Tee {
        log: Vec::new(),
        inner: root,
    };

    let mut scheduler = Scheduler::new(&config);
    scheduler.set_sequence(parse_events(SEQUENCE).unwrap());
    scheduler.start(0.0, 0.0).unwrap();
    run(&mut scheduler, &clock, &mut sink);

    // Tempo events stay with the transport
    assert_eq!(sink.log.len(), 6);
    assert!(sink.log.windows(2).all(|w| w[0].time <= w[1].time));
    assert_eq!(sink.log.last().map(|e| e.time), Some(2.5));

    let control = control.lock().unwrap();
    let gain = control.value_at_time(Name::GAIN, 0.5).unwrap();
    assert!((gain - 0.5).abs() < 1e-12);
    assert_eq!(control.value_at_time(Name::GAIN, 2.0), Some(1.0));

    // The first voice was still releasing when the second note started
    let instrument = instrument.lock().unwrap();
    let voices: Vec<&Monophonic> = instrument.pool().voices().collect();
    assert_eq!(voices.len(), 2);

    let frequency = voices[1].frequency().value_at_time(1.5);
    assert!((frequency - note_to_frequency(64.0)).abs() < 1e-9);

    let stop = voices[1].stop_time().unwrap();
    assert!((stop - (2.5 + config.release * T60)).abs() < 1e-9);

    assert_eq!(scheduler.transport_mut().beat_at_time(3.0), 8.0);
}

#[test]
fn test_nested_routes_and_bad_events() {
    let config = EngineConfig::default();
    let clock = ManualClock::new(0.0);

    let control = Arc::new(Mutex::new(ControlNode::new().with_param(Name::CUTOFF, 100.0)));
    let mut inner = Distributor::router();
    inner
        .register(3, Box::new(Distributor::new(Box::new(Shared(control.clone())))))
        .unwrap();
    let mut root = Distributor::router();
    root.register(1, Box::new(inner)).unwrap();
    let mut sink = Tee {
        log: Vec::new(),
        inner: root,
    };

    let sequence = parse_events(
        "0 1.3.cutoff 200\n\
         0 1.3.gain 1\n\
         0 1.4.cutoff 1\n\
         1 1.3.cutoff 800 exponential",
    )
    .unwrap();

    let mut scheduler = Scheduler::new(&config);
    scheduler.set_sequence(sequence);
    scheduler.start(0.0, 0.0).unwrap();
    run(&mut scheduler, &clock, &mut sink);

    assert_eq!(sink.log.len(), 4);

    // Unroutable events are dropped without stopping the rest
    let control = control.lock().unwrap();
    let cutoff = control.value_at_time(Name::CUTOFF, 0.25).unwrap();
    assert!((cutoff - 400.0).abs() < 1e-9);
    assert_eq!(control.value_at_time(Name::CUTOFF, 1.0), Some(800.0));
}
