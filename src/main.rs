// src/main.rs
//
// Demo: schedule a short sequence against a two-node hierarchy and print
// every buffer the scheduler dispatches.

use std::sync::Arc;

use cueline::clock::{Clock, ManualClock};
use cueline::distributor::{Distributor, EventSink};
use cueline::nodes::node_types;
use cueline::{EngineConfig, Event, NodeRegistry, Scheduler, Settings, parse_events, register_standard_nodes};

/// Beat-keyed demo sequence. Route 1 is an instrument, route 2 a control node.
const SEQUENCE: &str = "
# tempo and meter
0 rate 2
0 meter 3 1
0 1.start 60 0.8
1 1.stop 60
1 2.gain 0.25 linear 0
2 1.start 64 0.8
3 1.stop 64
3 2.gain 1 target 0.5
3 rate 3 linear 0
4 1.note 67 0.8
";

/// Prints each buffer before handing it on.
struct Printer<S: EventSink> {
    inner: S,
}

impl<S: EventSink> EventSink for Printer<S> {
    fn push(&mut self, events: &[Event]) {
        println!("--- buffer of {} ---", events.len());
        for event in events {
            println!("  {:>7.3}s  {}", event.time, event);
        }
        self.inner.push(events);
    }
}

/// ===============================
/// Main
/// ===============================

fn main() {
    env_logger::init();

    let config = EngineConfig::default();
    let clock = Arc::new(ManualClock::new(0.0));
    let shared: Arc<dyn Clock> = clock.clone();

    // --------------------------------
    // Targets
    // --------------------------------

    let mut registry = NodeRegistry::new();
    register_standard_nodes(&mut registry, config);

    let mut root = Distributor::router().with_clock(shared.clone());
    let instrument_settings: Settings = [("release".to_string(), 0.1)].into_iter().collect();
    let control_settings: Settings = [("gain".to_string(), 1.0)].into_iter().collect();

    for (index, type_name, settings) in [
        (1, node_types::INSTRUMENT, &instrument_settings),
        (2, node_types::CONTROL, &control_settings),
    ] {
        let target = match registry.create(type_name, &shared, settings) {
            Ok(target) => target,
            Err(err) => {
                eprintln!("failed to create {} node: {}", type_name, err);
                return;
            }
        };
        if let Err(err) = root.register(index, Box::new(Distributor::new(target))) {
            eprintln!("failed to register {} node: {}", type_name, err);
            return;
        }
    }

    // --------------------------------
    // Scheduler
    // --------------------------------

    let sequence = match parse_events(SEQUENCE) {
        Ok(events) => events,
        Err(err) => {
            eprintln!("bad sequence: {}", err);
            return;
        }
    };

    let mut scheduler = Scheduler::new(&config);
    scheduler.set_sequence(sequence);
    if let Err(err) = scheduler.start(0.0, 0.0) {
        eprintln!("failed to start: {}", err);
        return;
    }

    let mut sink = Printer { inner: root };

    println!("Starting scheduler demo…");

    // A timer thread would drive this; step the clock by hand instead
    while !scheduler.is_finished() {
        let now = clock.current_time();
        scheduler.tick(now, &mut sink);
        clock.advance(0.1);
    }

    let transport = scheduler.transport_mut();
    let end = clock.current_time();
    println!(
        "Done at {:.2}s: beat {:.3}, bar {:.3}, {:.1} bpm",
        end,
        transport.beat_at_time(end),
        transport.bar_at_time(end),
        transport.tempo_at_time(end)
    );
}
