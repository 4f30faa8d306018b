// src/automation.rs
//
// Automation engine.
//
// Native parameters cannot be queried for values in the past, so every
// change scheduled on a control target is also recorded in an
// `AutomationList`. The list is the authoritative answer to "what is the
// value at time T".
//
// Invariants:
// - entries are in non-decreasing time order
// - the list is never empty; it is seeded with a `Set` entry

use std::sync::Arc;

use log::{debug, warn};

use crate::address::CurveType;
use crate::event::Event;
use crate::parameter::ControlTarget;

/// Time for a target curve with a time constant of 1 to decay to -60dB.
pub const T60: f64 = 6.907_755_278_982_137;

/// One scheduled change in an automation list.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationEvent {
    pub time: f64,
    pub curve: CurveType,
    pub value: f64,
    /// Time constant for `Target`, span for `Curve`, otherwise 0.
    pub duration: f64,
    /// Shape for `Curve` entries.
    pub shape: Option<Arc<[f64]>>,
}

impl AutomationEvent {
    pub fn new(time: f64, curve: CurveType, value: f64, duration: f64) -> Self {
        Self {
            time,
            curve,
            value,
            duration,
            shape: None,
        }
    }

    /// Value this entry settles on: the last shape point for curves.
    #[inline]
    pub fn end_value(&self) -> f64 {
        match (&self.curve, &self.shape) {
            (CurveType::Curve, Some(shape)) => shape.last().copied().unwrap_or(self.value),
            _ => self.value,
        }
    }

    /// Sample a `Curve` entry at `time`.
    fn curve_value(&self, time: f64) -> f64 {
        let Some(shape) = self.shape.as_deref().filter(|s| !s.is_empty()) else {
            return self.value;
        };

        let elapsed = time - self.time;
        if shape.len() == 1 || self.duration <= 0.0 || elapsed >= self.duration {
            return shape[shape.len() - 1];
        }
        if elapsed <= 0.0 {
            return shape[0];
        }

        let position = elapsed / self.duration * (shape.len() - 1) as f64;
        let index = (position.floor() as usize).min(shape.len() - 2);
        let fraction = position - index as f64;
        shape[index] + (shape[index + 1] - shape[index]) * fraction
    }
}

/// Exponential approach from `from` towards `to`.
#[inline]
pub fn decay(from: f64, to: f64, elapsed: f64, time_constant: f64) -> f64 {
    if time_constant <= 0.0 {
        return to;
    }
    to + (from - to) * (-elapsed.max(0.0) / time_constant).exp()
}

/// Exponential interpolation is only defined between strictly positive values.
#[inline]
pub fn is_exponential_degenerate(v1: f64, v2: f64) -> bool {
    !(v1 > 0.0 && v2 > 0.0)
}

/// Ordered history of everything scheduled on one control target.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationList {
    events: Vec<AutomationEvent>,
}

impl AutomationList {
    /// A list seeded with `value` at time 0.
    pub fn new(value: f64) -> Self {
        Self::seeded_at(0.0, value)
    }

    pub fn seeded_at(time: f64, value: f64) -> Self {
        Self {
            events: vec![AutomationEvent::new(time, CurveType::Set, value, 0.0)],
        }
    }

    #[inline]
    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Index of the last entry at or before `time`.
    #[inline]
    pub fn index_at(&self, time: f64) -> Option<usize> {
        self.events.partition_point(|e| e.time <= time).checked_sub(1)
    }

    // -------------------------------
    // MARK: Queries
    // -------------------------------

    /// Value of the automation at `time`.
    pub fn value_at_time(&self, time: f64) -> f64 {
        let Some(n) = self.index_at(time) else {
            // Before the seed entry
            return self.events[0].value;
        };

        let event = &self.events[n];
        let Some(next) = self.events.get(n + 1) else {
            return self.value_at_event(n, time);
        };

        if time == event.time {
            return self.value_at_event(n, time);
        }

        let v1 = event.end_value();
        let v2 = next.value;
        let progress = (time - event.time) / (next.time - event.time);

        match next.curve {
            CurveType::Linear => v1 + (v2 - v1) * progress,
            CurveType::Exponential if is_exponential_degenerate(v1, v2) => v1,
            CurveType::Exponential => v1 * (v2 / v1).powf(progress),
            CurveType::Set
            | CurveType::Target
            | CurveType::Curve
            | CurveType::Hold
            | CurveType::Cancel => self.value_at_event(n, time),
        }
    }

    /// Value produced by entry `n` alone at `time`, ignoring following ramps.
    ///
    /// Target entries approach their value from wherever the previous
    /// entries left off, so a run of targets is walked from its first
    /// non-target anchor.
    pub fn value_at_event(&self, n: usize, time: f64) -> f64 {
        let event = &self.events[n];
        match event.curve {
            CurveType::Target => {
                let mut k = n;
                while k > 0 && self.events[k].curve == CurveType::Target {
                    k -= 1;
                }

                let anchor = &self.events[k];
                let (mut value, first) = if anchor.curve == CurveType::Target {
                    (anchor.value, k + 1)
                } else {
                    (self.settled_value(k, self.events[k + 1].time), k + 1)
                };

                for j in first..=n {
                    let entry = &self.events[j];
                    let end = if j == n { time } else { self.events[j + 1].time };
                    value = decay(value, entry.value, end - entry.time, entry.duration);
                }
                value
            }
            CurveType::Curve => event.curve_value(time),
            CurveType::Set
            | CurveType::Linear
            | CurveType::Exponential
            | CurveType::Hold
            | CurveType::Cancel => event.value,
        }
    }

    /// Value of a non-target entry at `time`.
    #[inline]
    fn settled_value(&self, n: usize, time: f64) -> f64 {
        let event = &self.events[n];
        match event.curve {
            CurveType::Curve => event.curve_value(time),
            _ => event.value,
        }
    }

    // -------------------------------
    // MARK: Mutation
    // -------------------------------

    /// Record a change. Returns the time at which the new state is settled.
    ///
    /// `Hold` freezes the value reached at `time` and discards everything
    /// after it. `Cancel` discards everything at or after `time`.
    /// Non-finite times are rejected and leave the list unchanged.
    pub fn set_automation(&mut self, time: f64, curve: CurveType, value: f64, duration: f64) -> f64 {
        if !time.is_finite() {
            warn!("dropping {} automation at non-finite time {}", curve, time);
            return time;
        }

        match curve {
            CurveType::Hold => {
                self.hold(time);
                time
            }
            CurveType::Cancel => {
                self.cancel(time);
                time
            }
            _ => {
                let n = self.events.partition_point(|e| e.time <= time);
                self.events
                    .insert(n, AutomationEvent::new(time, curve, value, duration));
                match curve {
                    CurveType::Target | CurveType::Curve => time + duration,
                    _ => time,
                }
            }
        }
    }

    /// Record a curve following `shape` across `[time, time + duration]`.
    pub fn set_curve(&mut self, time: f64, shape: Arc<[f64]>, duration: f64) -> f64 {
        if !time.is_finite() {
            warn!("dropping curve automation at non-finite time {}", time);
            return time;
        }

        let value = shape.first().copied().unwrap_or(0.0);
        let n = self.events.partition_point(|e| e.time <= time);
        self.events.insert(
            n,
            AutomationEvent {
                time,
                curve: CurveType::Curve,
                value,
                duration,
                shape: Some(shape),
            },
        );
        time + duration
    }

    fn hold(&mut self, time: f64) {
        let value = self.value_at_time(time);
        let n = self.events.partition_point(|e| e.time <= time);

        let following_ramp = self.events.get(n).is_some_and(|e| e.curve.is_ramp());
        let preceding_curve = n > 0
            && matches!(
                self.events[n - 1].curve,
                CurveType::Target | CurveType::Curve
            );

        self.events.truncate(n);

        if following_ramp || preceding_curve || self.events.is_empty() {
            debug!("automation hold at {:.3}: freezing at {}", time, value);
            self.events
                .push(AutomationEvent::new(time, CurveType::Set, value, 0.0));
        }
    }

    fn cancel(&mut self, time: f64) {
        let value = self.value_at_time(time);
        let n = self.events.partition_point(|e| e.time < time);
        self.events.truncate(n);
        if self.events.is_empty() {
            self.events
                .push(AutomationEvent::new(time, CurveType::Set, value, 0.0));
        }
    }

    /// Drop history before `time`, keeping the anchor for later queries.
    ///
    /// Queries at or after `time` return the same values as before.
    pub fn purge(&mut self, time: f64) {
        let Some(k) = self.index_at(time) else {
            return;
        };
        if k == 0 {
            return;
        }

        let anchor = &self.events[k];
        if anchor.curve == CurveType::Target {
            let start = self.value_at_event(k - 1, anchor.time);
            let at = anchor.time;
            self.events.drain(..k);
            self.events
                .insert(0, AutomationEvent::new(at, CurveType::Set, start, 0.0));
        } else {
            self.events.drain(..k);
        }
    }

    /// Drop all history but the newest anchor.
    pub fn purge_all(&mut self) {
        self.purge(f64::INFINITY);
    }
}

//
// ===============================
// MARK: Scheduling on targets
// ===============================
//

/// Schedule a change on `target` and record it in `list`.
///
/// Returns the time at which the change is settled.
pub fn automate(
    list: &mut AutomationList,
    target: &mut dyn ControlTarget,
    time: f64,
    curve: CurveType,
    value: f64,
    duration: f64,
) -> f64 {
    if !time.is_finite() {
        warn!("dropping {} automation at non-finite time {}", curve, time);
        return time;
    }

    match curve {
        CurveType::Set => target.set_value_at_time(value, time),
        CurveType::Linear => target.linear_ramp_to_value_at_time(value, time),
        CurveType::Exponential => {
            let from = list.value_at_time(time);
            if is_exponential_degenerate(from, value) {
                debug!(
                    "exponential ramp {} -> {} is degenerate, stepping at {:.3}",
                    from, value, time
                );
                target.set_value_at_time(value, time);
            } else {
                target.exponential_ramp_to_value_at_time(value, time);
            }
        }
        CurveType::Target => target.set_target_at_time(value, time, duration),
        CurveType::Curve => target.set_value_at_time(value, time),
        CurveType::Hold => target.cancel_and_hold_at_time(time),
        CurveType::Cancel => target.cancel_scheduled_values(time),
    }

    list.set_automation(time, curve, value, duration)
}

/// Schedule a shaped curve on `target` and record it in `list`.
pub fn automate_curve(
    list: &mut AutomationList,
    target: &mut dyn ControlTarget,
    time: f64,
    shape: Arc<[f64]>,
    duration: f64,
) -> f64 {
    if !time.is_finite() {
        warn!("dropping curve automation at non-finite time {}", time);
        return time;
    }

    target.set_value_curve_at_time(&shape, time, duration);
    list.set_curve(time, shape, duration)
}

/// Replace everything from `time` on with a relative batch of events.
///
/// Event times and durations are divided by `rate`, values multiplied by
/// `scale`. Returns the time at which the last change is settled.
pub fn automate_events(
    list: &mut AutomationList,
    target: &mut dyn ControlTarget,
    time: f64,
    events: &[Event],
    rate: f64,
    scale: f64,
) -> f64 {
    let mut settled = automate(list, target, time, CurveType::Hold, 0.0, 0.0);
    for event in events {
        let t = automate(
            list,
            target,
            time + event.time / rate,
            event.curve(),
            event.value1 * scale,
            event.value2 / rate,
        );
        settled = settled.max(t);
    }
    settled
}

//
// ===============================
// MARK: Owned parameter
// ===============================
//

/// A control target paired with the automation list it owns.
#[derive(Debug, Clone)]
pub struct AutomatedParam<T: ControlTarget> {
    target: T,
    automation: AutomationList,
}

impl<T: ControlTarget> AutomatedParam<T> {
    pub fn new(target: T) -> Self {
        let automation = AutomationList::new(target.value());
        Self { target, automation }
    }

    pub fn automate(&mut self, time: f64, curve: CurveType, value: f64, duration: f64) -> f64 {
        automate(&mut self.automation, &mut self.target, time, curve, value, duration)
    }

    pub fn automate_curve(&mut self, time: f64, shape: Arc<[f64]>, duration: f64) -> f64 {
        automate_curve(&mut self.automation, &mut self.target, time, shape, duration)
    }

    #[inline]
    pub fn value_at_time(&self, time: f64) -> f64 {
        self.automation.value_at_time(time)
    }

    #[inline]
    pub fn automation(&self) -> &AutomationList {
        &self.automation
    }

    #[inline]
    pub fn target(&self) -> &T {
        &self.target
    }

    #[inline]
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn purge(&mut self, time: f64) {
        self.automation.purge(time);
    }
}

//
// ===============================
// MARK: Arena
// ===============================
//

/// Handle to an automation list owned by [`Automations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(usize);

/// Arena of automation lists, one per control target.
///
/// Targets are identified by handle rather than by attaching data to them.
#[derive(Debug, Clone, Default)]
pub struct Automations {
    lists: Vec<AutomationList>,
}

impl Automations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target currently holding `value`.
    pub fn register(&mut self, value: f64) -> ParamId {
        self.lists.push(AutomationList::new(value));
        ParamId(self.lists.len() - 1)
    }

    #[inline]
    pub fn get(&self, id: ParamId) -> Option<&AutomationList> {
        self.lists.get(id.0)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ParamId) -> Option<&mut AutomationList> {
        self.lists.get_mut(id.0)
    }

    pub fn value_at_time(&self, id: ParamId, time: f64) -> Option<f64> {
        self.get(id).map(|list| list.value_at_time(time))
    }

    /// Schedule on `target`, recording in the list behind `id`.
    pub fn automate(
        &mut self,
        id: ParamId,
        target: &mut dyn ControlTarget,
        time: f64,
        curve: CurveType,
        value: f64,
        duration: f64,
    ) -> Option<f64> {
        let list = self.lists.get_mut(id.0)?;
        Some(automate(list, target, time, curve, value, duration))
    }

    /// Bound history growth of every list.
    pub fn purge(&mut self, time: f64) {
        for list in &mut self.lists {
            list.purge(time);
        }
    }
}
