// src/location.rs
//
// Tempo-curve integrals.
//
// A tempo automation list stores rates (beats per second) keyed by time.
// The functions here integrate the rate over one segment of the list to get
// beats, and invert that integral to get time. A segment starts at entry `j`
// and ends at entry `j + 1` (or runs forever for the last entry).
//
// Linear and exponential ramps have closed forms. Target and curve segments
// are integrated numerically and inverted with a capped Newton-Raphson
// iteration whose derivative is the instantaneous rate. Numeric integration
// only covers a segment's span (the shape of a curve, or `time_constant *
// T60` for a target, after which the approach is inaudible); past it the
// settled rate is extrapolated.

use log::warn;

use crate::address::CurveType;
use crate::automation::{AutomationList, T60, is_exponential_degenerate};

/// Trapezoid steps used to integrate target and curve segments.
pub const TRAPEZOID_STEPS: usize = 50;

/// Newton-Raphson iteration cap for numeric inversion.
pub const NEWTON_ITERATIONS: usize = 20;

/// Newton-Raphson convergence tolerance, in beats.
pub const NEWTON_TOLERANCE: f64 = 1e-10;

/// Rate floor used as the Newton derivative.
const MIN_RATE: f64 = 1e-3;

/// Slopes below this are treated as constant rate.
const MIN_SLOPE: f64 = 1e-10;

/// How a segment accrues beats.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Segment {
    Step { rate: f64 },
    Linear { rate: f64, slope: f64 },
    Exponential { rate: f64, ratio: f64, duration: f64 },
    /// Approach towards `settled`, numerically integrated across `span`
    Target { span: f64, settled: f64 },
    /// Shape across `span`, then constant at `settled`
    Curve { span: f64, settled: f64 },
}

fn segment(list: &AutomationList, j: usize) -> Segment {
    let events = list.events();
    let event = &events[j];

    if let Some(next) = events.get(j + 1) {
        let r1 = event.end_value();
        let r2 = next.value;
        let duration = next.time - event.time;

        match next.curve {
            CurveType::Linear if duration > 0.0 => {
                return Segment::Linear {
                    rate: r1,
                    slope: (r2 - r1) / duration,
                };
            }
            CurveType::Exponential if duration > 0.0 => {
                if is_exponential_degenerate(r1, r2) || r1 == r2 {
                    return Segment::Step { rate: r1 };
                }
                return Segment::Exponential {
                    rate: r1,
                    ratio: r2 / r1,
                    duration,
                };
            }
            _ => {}
        }
    }

    match event.curve {
        CurveType::Target => Segment::Target {
            span: event.duration.max(0.0) * T60,
            settled: event.end_value(),
        },
        CurveType::Curve => Segment::Curve {
            span: event.duration.max(0.0),
            settled: event.end_value(),
        },
        _ => Segment::Step {
            rate: list.value_at_event(j, event.time),
        },
    }
}

/// Instantaneous rate at `time` inside segment `j`.
pub fn rate_in_segment(list: &AutomationList, j: usize, time: f64) -> f64 {
    let start = list.events()[j].time;
    match segment(list, j) {
        Segment::Step { rate } => rate,
        Segment::Linear { rate, slope } => rate + slope * (time - start),
        Segment::Exponential {
            rate,
            ratio,
            duration,
        } => rate * ratio.powf((time - start) / duration),
        Segment::Target { .. } | Segment::Curve { .. } => list.value_at_event(j, time),
    }
}

/// Trapezoidal integral of the rate of segment `j` over `[from, to]`.
fn integrate(list: &AutomationList, j: usize, from: f64, to: f64) -> f64 {
    if to <= from {
        return 0.0;
    }

    let step = (to - from) / TRAPEZOID_STEPS as f64;
    let mut sum = 0.5 * (list.value_at_event(j, from) + list.value_at_event(j, to));
    for i in 1..TRAPEZOID_STEPS {
        sum += list.value_at_event(j, from + step * i as f64);
    }
    sum * step
}

/// Beats accrued between the start of segment `j` and `time`.
///
/// `time` is expected to lie within the segment.
pub fn beats_in_segment(list: &AutomationList, j: usize, time: f64) -> f64 {
    let start = list.events()[j].time;
    let elapsed = time - start;
    if elapsed <= 0.0 {
        return 0.0;
    }

    match segment(list, j) {
        Segment::Step { rate } => rate * elapsed,
        Segment::Linear { rate, slope } => rate * elapsed + 0.5 * slope * elapsed * elapsed,
        Segment::Exponential {
            rate,
            ratio,
            duration,
        } => duration * rate * (ratio.powf(elapsed / duration) - 1.0) / ratio.ln(),
        Segment::Target { span, settled } | Segment::Curve { span, settled } => {
            if elapsed <= span {
                integrate(list, j, start, time)
            } else {
                let end = start + span;
                integrate(list, j, start, end) + settled * (time - end)
            }
        }
    }
}

/// Time offset from the start of segment `j` at which `beats` have accrued.
///
/// Returns `f64::INFINITY` when the rate never accrues that many beats.
pub fn time_in_segment(list: &AutomationList, j: usize, beats: f64) -> f64 {
    if beats <= 0.0 {
        return 0.0;
    }

    match segment(list, j) {
        Segment::Step { rate } => step_time(rate, beats),
        Segment::Linear { rate, slope } => {
            if slope.abs() < MIN_SLOPE {
                return step_time(rate, beats);
            }
            let discriminant = rate * rate + 2.0 * slope * beats;
            if discriminant < 0.0 {
                warn!(
                    "tempo ramp reaches zero before beat offset {:.3}, time is unbounded",
                    beats
                );
                return f64::INFINITY;
            }
            (discriminant.sqrt() - rate) / slope
        }
        Segment::Exponential {
            rate,
            ratio,
            duration,
        } => {
            let ln = ratio.ln();
            let argument = 1.0 + beats * ln / (rate * duration);
            if argument <= 0.0 {
                warn!(
                    "exponential tempo ramp cannot accrue {:.3} beats, time is unbounded",
                    beats
                );
                return f64::INFINITY;
            }
            duration * argument.ln() / ln
        }
        Segment::Target { span, settled } | Segment::Curve { span, settled } => {
            let start = list.events()[j].time;
            let span_beats = beats_in_segment(list, j, start + span);
            if beats <= span_beats {
                return newton(list, j, beats);
            }
            span + step_time(settled, beats - span_beats)
        }
    }
}

#[inline]
fn step_time(rate: f64, beats: f64) -> f64 {
    if rate <= 0.0 {
        warn!("tempo rate {} never reaches beat offset {:.3}", rate, beats);
        return f64::INFINITY;
    }
    beats / rate
}

/// Solve `beats_in_segment(j, start + τ) == beats` for τ.
///
/// The derivative is the instantaneous rate, floored to keep steps finite.
/// If the iteration cap is hit, one last step is taken from the final
/// estimate using its rate.
fn newton(list: &AutomationList, j: usize, beats: f64) -> f64 {
    solve(list, j, beats, NEWTON_ITERATIONS)
}

fn solve(list: &AutomationList, j: usize, beats: f64, iterations: usize) -> f64 {
    let start = list.events()[j].time;
    let mut tau = beats / list.value_at_event(j, start).max(MIN_RATE);

    for _ in 0..iterations {
        let residual = beats_in_segment(list, j, start + tau) - beats;
        if residual.abs() < NEWTON_TOLERANCE {
            return tau;
        }
        let rate = rate_in_segment(list, j, start + tau).max(MIN_RATE);
        tau = (tau - residual / rate).max(0.0);
    }

    let residual = beats_in_segment(list, j, start + tau) - beats;
    let rate = rate_in_segment(list, j, start + tau).max(MIN_RATE);
    warn!(
        "tempo inversion did not converge at beat offset {:.3}, residual {:e}",
        beats, residual
    );
    (tau - residual / rate).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() < tolerance
    }

    #[test]
    fn test_step_segment() {
        let list = AutomationList::new(2.0);
        assert_eq!(beats_in_segment(&list, 0, 4.0), 8.0);
        assert_eq!(time_in_segment(&list, 0, 8.0), 4.0);
    }

    #[test]
    fn test_zero_rate_is_unbounded() {
        let list = AutomationList::new(0.0);
        assert_eq!(time_in_segment(&list, 0, 1.0), f64::INFINITY);
    }

    #[test]
    fn test_linear_segment() {
        let mut list = AutomationList::new(1.0);
        list.set_automation(2.0, CurveType::Linear, 3.0, 0.0);

        // Average rate 2 over 2 seconds
        assert!(approx(beats_in_segment(&list, 0, 2.0), 4.0, 1e-12));
        assert!(approx(beats_in_segment(&list, 0, 1.0), 1.5, 1e-12));
        assert!(approx(time_in_segment(&list, 0, 1.5), 1.0, 1e-12));
        assert!(approx(time_in_segment(&list, 0, 4.0), 2.0, 1e-12));
    }

    #[test]
    fn test_exponential_segment() {
        let mut list = AutomationList::new(1.0);
        list.set_automation(1.0, CurveType::Exponential, 4.0, 0.0);

        let expected = 3.0 / 4.0f64.ln();
        assert!(approx(beats_in_segment(&list, 0, 1.0), expected, 1e-12));
        assert!(approx(time_in_segment(&list, 0, expected), 1.0, 1e-9));
        let half = beats_in_segment(&list, 0, 0.5);
        assert!(approx(time_in_segment(&list, 0, half), 0.5, 1e-9));
    }

    #[test]
    fn test_target_segment_round_trip() {
        let mut list = AutomationList::new(2.0);
        list.set_automation(0.0, CurveType::Target, 1.0, 0.5);
        let j = list.len() - 1;

        // Rate starts at 2 and settles towards 1
        let beats = beats_in_segment(&list, j, 1.0);
        assert!(beats > 1.0 && beats < 2.0);

        let time = time_in_segment(&list, j, beats);
        assert!(approx(time, 1.0, 1e-6));
    }

    #[test]
    fn test_target_segment_far_from_anchor() {
        let mut list = AutomationList::new(2.0);
        list.set_automation(0.0, CurveType::Target, 1.0, 0.1);
        let j = list.len() - 1;

        // Exact integral: t + 0.1 * (1 - e^(-t / 0.1))
        let exact = |t: f64| t + 0.1 * (1.0 - (-t / 0.1).exp());
        for t in [1.0, 10.0, 100.0, 1000.0] {
            let beats = beats_in_segment(&list, j, t);
            assert!(approx(beats, exact(t), 1e-3), "beats at {}: {}", t, beats);
            assert!(approx(time_in_segment(&list, j, beats), t, 1e-6));
        }
    }

    #[test]
    fn test_newton_fallback_steps_from_final_rate() {
        let mut list = AutomationList::new(2.0);
        list.set_automation(0.0, CurveType::Target, 1.0, 0.5);
        let j = list.len() - 1;
        let beats = beats_in_segment(&list, j, 1.0);

        // One iteration, then the fallback step
        let tau0 = beats / 2.0;
        let tau1 = tau0 - (beats_in_segment(&list, j, tau0) - beats) / rate_in_segment(&list, j, tau0);
        let tau2 = tau1 - (beats_in_segment(&list, j, tau1) - beats) / rate_in_segment(&list, j, tau1);

        let time = solve(&list, j, beats, 1);
        assert!(time.is_finite() && time >= 0.0);
        assert!(approx(time, tau2, 1e-12));
        assert!((time - 1.0).abs() < (tau1 - 1.0).abs());
    }

    #[test]
    fn test_newton_fallback_on_flat_rate_is_finite() {
        let mut list = AutomationList::new(1.0);
        list.set_curve(0.0, std::sync::Arc::from(vec![1.0, 0.0, 0.0, 0.0, 1.0]), 4.0);
        let j = list.len() - 1;

        // The first step lands on the zero-rate plateau
        for iterations in 0..3 {
            let time = solve(&list, j, 0.75, iterations);
            assert!(time.is_finite() && time >= 0.0, "{} iterations: {}", iterations, time);
        }
        // Exactly 3 + √0.5 before quadrature error
        let time = time_in_segment(&list, j, 0.75);
        assert!(time > 3.6 && time < 3.8, "{}", time);
    }

    #[test]
    fn test_curve_segment_extrapolates_past_span() {
        let mut list = AutomationList::new(1.0);
        list.set_curve(0.0, std::sync::Arc::from(vec![1.0, 3.0]), 1.0);
        let j = list.len() - 1;

        let span_beats = beats_in_segment(&list, j, 1.0);
        assert!(approx(span_beats, 2.0, 1e-9));
        assert!(approx(beats_in_segment(&list, j, 2.0), 5.0, 1e-9));
        assert!(approx(time_in_segment(&list, j, 5.0), 2.0, 1e-9));
        // τ + τ² = 1
        let golden = (5.0f64.sqrt() - 1.0) / 2.0;
        assert!(approx(time_in_segment(&list, j, 1.0), golden, 1e-9));
    }
}
