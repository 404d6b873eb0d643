//! Input shaping filters for operator axes and noisy sensor channels.

use embassy_time::Instant;
use heapless::Deque;

use super::{elapsed, secs};

/// Apply a deadband then a sign-preserving square-law curve to a raw axis in `[-1, 1]`.
///
/// Non-finite input is treated as centred.
pub fn shape_axis(
    raw: f32,
    deadband: f32,
) -> f32 {
    if !raw.is_finite() {
        return 0.0;
    }
    let raw = raw.clamp(-1.0, 1.0);
    if libm::fabsf(raw) > deadband {
        raw * raw * libm::copysignf(1.0, raw)
    } else {
        0.0
    }
}

/// Limits the rate of change of a signal to `rate` units per second.
#[derive(Debug, Clone)]
pub struct SlewRateLimiter {
    rate: f32,
    prev_val: f32,
    prev_time: Option<Instant>,
}

impl SlewRateLimiter {
    pub fn new(rate: f32) -> Self {
        Self {
            rate,
            prev_val: 0.0,
            prev_time: None,
        }
    }

    /// Move toward `input` by at most `rate * elapsed` since the previous call.
    pub fn calculate(
        &mut self,
        input: f32,
        now: Instant,
    ) -> f32 {
        let dt = self.prev_time.map_or(0.0, |t| secs(elapsed(now, t)));
        let max_step = self.rate * dt;
        self.prev_val += (input - self.prev_val).clamp(-max_step, max_step);
        self.prev_time = Some(now);
        self.prev_val
    }

    /// Jump straight to `value` and restart the time base at `now`.
    pub fn reset(
        &mut self,
        value: f32,
        now: Instant,
    ) {
        self.prev_val = value;
        self.prev_time = Some(now);
    }

    pub fn last(&self) -> f32 {
        self.prev_val
    }
}

/// Mean of the last `N` samples.
#[derive(Debug, Clone, Default)]
pub struct MovingAverage<const N: usize> {
    window: Deque<f32, N>,
}

impl<const N: usize> MovingAverage<N> {
    pub fn new() -> Self {
        Self {
            window: Deque::new(),
        }
    }

    /// Add a sample, discarding the oldest once the window is full. Returns the new mean.
    pub fn calculate(
        &mut self,
        sample: f32,
    ) -> f32 {
        if !sample.is_finite() {
            return self.value();
        }
        if self.window.is_full() {
            self.window.pop_front();
        }
        let _ = self.window.push_back(sample);
        self.value()
    }

    pub fn value(&self) -> f32 {
        if self.window.is_empty() {
            0.0
        } else {
            self.window.iter().sum::<f32>() / self.window.len() as f32
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Duration;

    #[test]
    fn deadband_snaps_small_inputs() {
        assert_eq!(shape_axis(0.1, 0.15), 0.0);
        assert_eq!(shape_axis(-0.15, 0.15), 0.0);
        assert_eq!(shape_axis(f32::NAN, 0.15), 0.0);
    }

    #[test]
    fn square_law_preserves_sign() {
        assert!((shape_axis(0.5, 0.15) - 0.25).abs() < 1e-6);
        assert!((shape_axis(-0.5, 0.15) + 0.25).abs() < 1e-6);
        assert_eq!(shape_axis(1.0, 0.15), 1.0);
    }

    #[test]
    fn slew_limits_step_per_tick() {
        let t0 = Instant::from_millis(0);
        let mut limiter = SlewRateLimiter::new(8.0);
        limiter.reset(0.0, t0);
        let out = limiter.calculate(4.0, t0 + Duration::from_millis(20));
        assert!((out - 0.16).abs() < 1e-5);
        let out = limiter.calculate(4.0, t0 + Duration::from_millis(40));
        assert!((out - 0.32).abs() < 1e-5);
        let out = limiter.calculate(-4.0, t0 + Duration::from_millis(60));
        assert!((out - 0.16).abs() < 1e-5);
    }

    #[test]
    fn slew_first_sample_holds_value() {
        let mut limiter = SlewRateLimiter::new(8.0);
        assert_eq!(limiter.calculate(4.0, Instant::from_millis(100)), 0.0);
    }

    #[test]
    fn moving_average_window() {
        let mut avg = MovingAverage::<3>::new();
        avg.calculate(3.0);
        avg.calculate(6.0);
        assert!((avg.value() - 4.5).abs() < 1e-6);
        avg.calculate(9.0);
        assert!((avg.calculate(12.0) - 9.0).abs() < 1e-6);
        avg.reset();
        assert_eq!(avg.value(), 0.0);
    }
}
