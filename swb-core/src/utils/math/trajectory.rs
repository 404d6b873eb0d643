//! Time-parameterised holonomic paths and the controller that tracks them.
//!
//! A [`Trajectory`] is a list of [`TrajectoryState`]s sorted by time. The path
//! heading (`pose.rotation`) is the direction of travel; the chassis facing is
//! carried separately as `holonomic_rotation`, since a swerve base may strafe.
//!
//! # Example
//! ```rust
//! use swb_core::utils::math::geometry::{Pose2d, Rotation2d};
//! use swb_core::utils::math::trajectory::{Alliance, Trajectory, TrajectoryState};
//! let traj = Trajectory::new(vec![
//!     TrajectoryState::at(0.0, Pose2d::new(1.0, 1.0, Rotation2d::ZERO), 0.0),
//!     TrajectoryState::at(2.0, Pose2d::new(3.0, 1.0, Rotation2d::ZERO), 0.0),
//! ])
//! .unwrap();
//! assert!((traj.sample(1.0).pose.x() - 2.0).abs() < 1e-6);
//! let red = traj.transform_for_alliance(Alliance::Red);
//! assert!((red.initial_state().pose.y() - 7.02).abs() < 1e-5);
//! ```

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::{
    geometry::{Pose2d, Rotation2d, Translation2d},
    kinematics::ChassisSpeeds,
    pid::{PidController, PidGains},
};

/// Width of the field along Y, used to mirror blue-side paths for the red alliance.
pub const FIELD_WIDTH: f32 = 8.02;

/// Side of the field the robot starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alliance {
    #[default]
    Blue,
    Red,
}

impl Alliance {
    pub fn is_red(self) -> bool {
        matches!(self, Alliance::Red)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrajectoryError {
    Empty,
    NonFinite { index: usize },
    NonMonotonic { index: usize },
}

impl core::fmt::Display for TrajectoryError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        match self {
            TrajectoryError::Empty => write!(f, "trajectory has no states"),
            TrajectoryError::NonFinite { index } => write!(f, "state {} is not finite", index),
            TrajectoryError::NonMonotonic { index } => {
                write!(f, "state {} goes back in time", index)
            }
        }
    }
}

/// One sample of a path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryState {
    /// Seconds since the start of the path
    pub time: f32,
    /// Field position and direction of travel
    pub pose: Pose2d,
    /// Speed along the direction of travel (m/s)
    pub velocity: f32,
    /// Rate of change of the direction of travel (rad/s)
    pub angular_velocity: f32,
    /// Chassis facing
    pub holonomic_rotation: Rotation2d,
    /// Rate of change of the chassis facing (rad/s)
    pub holonomic_angular_velocity: f32,
}

impl TrajectoryState {
    /// A state travelling along `pose.rotation` while facing the same way.
    pub fn at(
        time: f32,
        pose: Pose2d,
        velocity: f32,
    ) -> Self {
        Self {
            time,
            pose,
            velocity,
            angular_velocity: 0.0,
            holonomic_rotation: pose.rotation,
            holonomic_angular_velocity: 0.0,
        }
    }

    fn is_finite(&self) -> bool {
        self.time.is_finite()
            && self.pose.is_finite()
            && self.velocity.is_finite()
            && self.angular_velocity.is_finite()
            && self.holonomic_rotation.radians().is_finite()
            && self.holonomic_angular_velocity.is_finite()
    }

    fn interpolate(
        &self,
        end: &TrajectoryState,
        t: f32,
    ) -> TrajectoryState {
        let lerp = |a: f32, b: f32| a + (b - a) * t;
        TrajectoryState {
            time: lerp(self.time, end.time),
            pose: Pose2d {
                translation: self.pose.translation.interpolate(end.pose.translation, t),
                rotation: self.pose.rotation.interpolate(end.pose.rotation, t),
            },
            velocity: lerp(self.velocity, end.velocity),
            angular_velocity: lerp(self.angular_velocity, end.angular_velocity),
            holonomic_rotation: self
                .holonomic_rotation
                .interpolate(end.holonomic_rotation, t),
            holonomic_angular_velocity: lerp(
                self.holonomic_angular_velocity,
                end.holonomic_angular_velocity,
            ),
        }
    }

    fn mirrored(&self) -> TrajectoryState {
        TrajectoryState {
            time: self.time,
            pose: Pose2d {
                translation: Translation2d::new(self.pose.x(), FIELD_WIDTH - self.pose.y()),
                rotation: -self.pose.rotation,
            },
            velocity: self.velocity,
            angular_velocity: -self.angular_velocity,
            holonomic_rotation: -self.holonomic_rotation,
            holonomic_angular_velocity: -self.holonomic_angular_velocity,
        }
    }
}

/// A validated, time-ordered path.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    states: Vec<TrajectoryState>,
}

impl Trajectory {
    /// Validate that `states` is non-empty, finite and ordered by time.
    pub fn new(states: Vec<TrajectoryState>) -> Result<Self, TrajectoryError> {
        if states.is_empty() {
            return Err(TrajectoryError::Empty);
        }
        for (index, state) in states.iter().enumerate() {
            if !state.is_finite() {
                return Err(TrajectoryError::NonFinite { index });
            }
            if index > 0 && state.time < states[index - 1].time {
                return Err(TrajectoryError::NonMonotonic { index });
            }
        }
        Ok(Self { states })
    }

    pub fn states(&self) -> &[TrajectoryState] {
        &self.states
    }

    pub fn initial_state(&self) -> TrajectoryState {
        self.states[0]
    }

    pub fn end_state(&self) -> TrajectoryState {
        self.states[self.states.len() - 1]
    }

    pub fn total_time(&self) -> f32 {
        self.end_state().time
    }

    /// Interpolated state at `time` seconds, clamped to the ends of the path.
    pub fn sample(
        &self,
        time: f32,
    ) -> TrajectoryState {
        let first = self.initial_state();
        let last = self.end_state();
        if time <= first.time {
            return first;
        }
        if time >= last.time {
            return last;
        }
        let upper = self.states.partition_point(|s| s.time < time);
        let prev = &self.states[upper - 1];
        let next = &self.states[upper];
        let span = next.time - prev.time;
        if span <= 0.0 {
            return *next;
        }
        prev.interpolate(next, (time - prev.time) / span)
    }

    /// Paths are authored for the blue side; red mirrors them across the field centre line.
    pub fn transform_for_alliance(
        &self,
        alliance: Alliance,
    ) -> Trajectory {
        match alliance {
            Alliance::Blue => self.clone(),
            Alliance::Red => Trajectory {
                states: self.states.iter().map(TrajectoryState::mirrored).collect(),
            },
        }
    }
}

/// Feed-forward plus PID feedback on x, y and chassis heading.
#[derive(Debug, Clone)]
pub struct HolonomicController {
    x: PidController,
    y: PidController,
    rotation: PidController,
}

impl HolonomicController {
    pub fn new(
        translation: PidGains,
        rotation: PidGains,
        dt: f32,
    ) -> Self {
        Self {
            x: PidController::new(translation, dt),
            y: PidController::new(translation, dt),
            rotation: PidController::new(rotation, dt).with_continuous_angle(),
        }
    }

    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
        self.rotation.reset();
    }

    /// Robot-relative speeds that move `current` onto `target`.
    pub fn calculate(
        &mut self,
        current: Pose2d,
        target: &TrajectoryState,
    ) -> ChassisSpeeds {
        let vx_ff = target.velocity * target.pose.rotation.cos();
        let vy_ff = target.velocity * target.pose.rotation.sin();

        let vx_fb = self.x.calculate(current.x(), target.pose.x());
        let vy_fb = self.y.calculate(current.y(), target.pose.y());
        let omega_fb = self.rotation.calculate(
            current.rotation.radians(),
            target.holonomic_rotation.radians(),
        );

        ChassisSpeeds::from_field_relative(
            vx_ff + vx_fb,
            vy_ff + vy_fb,
            target.holonomic_angular_velocity + omega_fb,
            current.rotation,
        )
    }
}
