//! Math utilities for the swerve drivetrain.
//!
//! - `geometry`: poses, rotations and twists on the field plane
//! - `kinematics`: chassis ↔ module conversions and desaturation
//! - `pid`: discrete PID controller
//! - `filters`: deadband/curve shaping, slew-rate limiting, moving average
//! - `trajectory`: time-parameterised paths and the holonomic follower

pub mod filters;
pub mod geometry;
pub mod kinematics;
pub mod pid;
pub mod trajectory;

use embassy_time::{Duration, Instant};

/// Time elapsed from `since` to `now`, zero if `now` is earlier.
pub fn elapsed(
    now: Instant,
    since: Instant,
) -> Duration {
    now.checked_duration_since(since)
        .unwrap_or(Duration::from_ticks(0))
}

/// Duration in fractional seconds.
pub fn secs(d: Duration) -> f32 {
    d.as_micros() as f32 / 1_000_000.0
}

/// Fractional seconds to a duration; negative and non-finite values become zero.
pub fn from_secs(seconds: f32) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_micros((seconds * 1_000_000.0) as u64)
    } else {
        Duration::from_ticks(0)
    }
}
