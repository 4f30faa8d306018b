// src/parameter.rs
//
// Control-signal targets.
//
// The DSP graph is an external collaborator. Its automatable parameters are
// seen here only through `ControlTarget`, which mirrors the native scheduling
// primitives of a Web Audio style parameter. Targets are never asked for
// past values: the automation engine keeps its own record of what was
// scheduled.

use std::sync::Arc;

/// Native scheduling primitives of an automatable parameter.
pub trait ControlTarget {
    fn set_value_at_time(&mut self, value: f64, time: f64);

    fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64);

    fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64);

    /// Approach `value` from `time` on, with `time_constant` in seconds.
    fn set_target_at_time(&mut self, value: f64, time: f64, time_constant: f64);

    /// Follow `curve` across `[time, time + duration]`.
    ///
    /// Targets without native curve support jump to the final point.
    fn set_value_curve_at_time(&mut self, curve: &[f64], time: f64, duration: f64) {
        if let Some(&last) = curve.last() {
            self.set_value_at_time(last, time + duration);
        }
    }

    /// Freeze at the value reached at `time`, discarding later changes.
    fn cancel_and_hold_at_time(&mut self, time: f64);

    /// Discard changes scheduled at or after `time`.
    fn cancel_scheduled_values(&mut self, time: f64);

    /// Current scalar value.
    fn value(&self) -> f64;
}

/// One call received by a [`RecordedParam`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamCall {
    Set { value: f64, time: f64 },
    Linear { value: f64, time: f64 },
    Exponential { value: f64, time: f64 },
    Target { value: f64, time: f64, time_constant: f64 },
    Curve { curve: Arc<[f64]>, time: f64, duration: f64 },
    Hold { time: f64 },
    Cancel { time: f64 },
}

/// In-memory control target that records every scheduling call.
///
/// Stands in for a native parameter in hosts without one (offline
/// rendering, tests, the demo binary).
#[derive(Debug, Clone, Default)]
pub struct RecordedParam {
    value: f64,
    calls: Vec<ParamCall>,
}

impl RecordedParam {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[ParamCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl ControlTarget for RecordedParam {
    fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.value = value;
        self.calls.push(ParamCall::Set { value, time });
    }

    fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.calls.push(ParamCall::Linear { value, time });
    }

    fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.calls.push(ParamCall::Exponential { value, time });
    }

    fn set_target_at_time(&mut self, value: f64, time: f64, time_constant: f64) {
        self.calls.push(ParamCall::Target {
            value,
            time,
            time_constant,
        });
    }

    fn set_value_curve_at_time(&mut self, curve: &[f64], time: f64, duration: f64) {
        self.calls.push(ParamCall::Curve {
            curve: Arc::from(curve),
            time,
            duration,
        });
    }

    fn cancel_and_hold_at_time(&mut self, time: f64) {
        self.calls.push(ParamCall::Hold { time });
    }

    fn cancel_scheduled_values(&mut self, time: f64) {
        self.calls.push(ParamCall::Cancel { time });
    }

    fn value(&self) -> f64 {
        self.value
    }
}
