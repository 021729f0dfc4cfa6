//! Velocity profile evaluation.
//!
//! Provides the trapezoid rate ramps and the quintic Bézier (S-curve) evaluator
//! used by the block phase to pick the step rate for the next interval.
//!
//! The Bézier curve `V(t) = A·t⁵ + B·t⁴ + C·t³ + F` with `t` in `[0, 1)` is
//! evaluated in fixed point. `t` is derived from the elapsed ticks in the phase
//! multiplied by the phase's inverse duration (`0xFFFF_FFFF / ticks`), so the
//! evaluator never divides.

use crate::config::CurvePrecision;

/// Multiply a tick count by a Q24 per-tick rate.
#[inline]
pub fn step_multiply(ticks: u32, rate_q24: u32) -> u32 {
    ((ticks as u64 * rate_q24 as u64) >> 24) as u32
}

/// Trapezoid acceleration ramp: `initial + a·t`, capped at `nominal`.
#[inline]
pub fn accelerate_rate(elapsed: u32, acceleration_rate: u32, initial: u32, nominal: u32) -> u32 {
    step_multiply(elapsed, acceleration_rate)
        .saturating_add(initial)
        .min(nominal)
}

/// Trapezoid deceleration ramp from `start_rate`, floored at `final_rate`.
#[inline]
pub fn decelerate_rate(elapsed: u32, acceleration_rate: u32, start_rate: u32, final_rate: u32) -> u32 {
    let drop = step_multiply(elapsed, acceleration_rate);
    if drop < start_rate {
        (start_rate - drop).max(final_rate)
    } else {
        final_rate
    }
}

/// `0xFFFF_FFFF / ticks`, the scale that maps a phase duration onto `t ∈ [0, 1)`.
#[inline]
pub fn period_inverse(ticks: u32) -> u32 {
    if ticks == 0 {
        u32::MAX
    } else {
        u32::MAX / ticks
    }
}

/// Coefficients of one Bézier speed curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Coefficients {
    a: i32,
    b: i32,
    c: i32,
    f: i32,
    av: u32,
    /// Narrow form stores magnitudes and the sign of `A` separately.
    a_negative: bool,
}

/// Quintic Bézier speed curve evaluator.
#[derive(Debug, Clone, Copy)]
pub struct BezierCurve {
    precision: CurvePrecision,
    coeffs: Coefficients,
}

impl BezierCurve {
    /// Create an evaluator with the given fixed-point width.
    pub fn new(precision: CurvePrecision) -> Self {
        Self {
            precision,
            coeffs: Coefficients::default(),
        }
    }

    /// Fixed-point width in use.
    #[inline]
    pub fn precision(&self) -> CurvePrecision {
        self.precision
    }

    /// Prepare a curve from rate `v0` to rate `v1` over a phase whose inverse
    /// duration is `av` (see [`period_inverse`]).
    pub fn init(&mut self, v0: u32, v1: u32, av: u32) {
        let v0 = v0 as i32;
        let v1 = v1 as i32;
        self.coeffs = match self.precision {
            CurvePrecision::Wide => Coefficients {
                a: 768i32.wrapping_mul(v1 - v0),
                b: 1920i32.wrapping_mul(v0 - v1),
                c: 1280i32.wrapping_mul(v1 - v0),
                f: 128i32.wrapping_mul(v0),
                av,
                a_negative: false,
            },
            CurvePrecision::Narrow => {
                let delta = (v1 - v0).abs();
                Coefficients {
                    a: 6 * delta,
                    b: 15 * delta,
                    c: 10 * delta,
                    f: v0,
                    av,
                    a_negative: v1 < v0,
                }
            }
        };
    }

    /// Rate after `elapsed` ticks into the phase.
    pub fn eval(&self, elapsed: u32) -> u32 {
        let rate = match self.precision {
            CurvePrecision::Wide => self.eval_wide(elapsed),
            CurvePrecision::Narrow => self.eval_narrow(elapsed),
        };
        rate.max(0) as u32
    }

    fn eval_wide(&self, elapsed: u32) -> i64 {
        let c = &self.coeffs;
        let t = c.av.wrapping_mul(elapsed) as u64;

        // f = t³ with a 32-bit fraction
        let mut f = (t * t) >> 32;
        f = (f * t) >> 32;
        let mut acc = (c.f as i64) << 31;
        acc += ((f as u32) >> 1) as i64 * c.c as i64;
        f = (f * t) >> 32;
        acc += ((f as u32) >> 1) as i64 * c.b as i64;
        f = (f * t) >> 32;
        acc += ((f as u32) >> 1) as i64 * c.a as i64;
        acc >> 38
    }

    fn eval_narrow(&self, elapsed: u32) -> i64 {
        let c = &self.coeffs;
        if elapsed == 0 {
            return c.f as i64;
        }

        // 24 x 24 -> upper 16 bits
        let t = (((c.av >> 8) as u64 * elapsed as u64) >> 8).min(u16::MAX as u64) as u32;
        // 16 x 16 -> upper 16 bits
        let mul16 = |x: u32| (x * t) >> 16;
        // 16 x 24 -> upper 24 bits
        let mul24 = |x: u32, coeff: i32| ((x as u64 * coeff as u64) >> 16) as i64;

        let mut f = mul16(t);
        f = mul16(f);
        let mut acc = c.f as i64;
        let sign = if c.a_negative { -1 } else { 1 };
        acc += sign * mul24(f, c.c);
        f = mul16(f);
        acc -= sign * mul24(f, c.b);
        f = mul16(f);
        acc += sign * mul24(f, c.a);
        acc
    }
}
