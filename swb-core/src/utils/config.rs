//! Robot configuration, loaded once at start-up.
//!
//! Every section falls back to its defaults field by field, so a config file
//! only needs the values it changes.
//!
//! # Example
//! ```rust
//! use swb_core::utils::config::RobotConfig;
//! use swb_core::utils::robot::autos::AutoRoutine;
//!
//! let config = RobotConfig::from_json(r#"{"alliance":"red","auto":{"routine":"shoot_cube"}}"#).unwrap();
//! assert!(config.alliance.is_red());
//! assert_eq!(config.auto.routine, AutoRoutine::ShootCube);
//! assert_eq!(config.drive.deadband, 0.15);
//! ```

use alloc::{vec, vec::Vec};

use serde::{Deserialize, Serialize};

use crate::utils::{
    controllers::{
        climb::ClimbConfig, drive::DriveConfig, elevator::ElevatorConfig, gripper::GripperConfig,
        intake::IntakeConfig, vision::VisionConfig, wheels::WheelsConfig,
    },
    estimation::EstimatorConfig,
    math::{
        geometry::{Pose2d, Rotation2d},
        trajectory::{Alliance, Trajectory, TrajectoryError, TrajectoryState},
    },
    robot::autos::AutoRoutine,
};

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Trajectory(TrajectoryError),
}

impl core::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "invalid config: {}", e),
            ConfigError::Trajectory(e) => write!(f, "invalid balance path: {}", e),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<TrajectoryError> for ConfigError {
    fn from(e: TrajectoryError) -> Self {
        ConfigError::Trajectory(e)
    }
}

/// Autonomous selection and field data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoConfig {
    pub routine: AutoRoutine,
    pub blue_start: Pose2d,
    pub red_start: Pose2d,
    /// Blue-side path onto the charge station; mirrored on red.
    pub balance_path: Vec<TrajectoryState>,
    /// Open-loop leg of the move-back routine (s)
    pub move_back_secs: f32,
}

impl Default for AutoConfig {
    fn default() -> Self {
        let start = Pose2d::new(1.85, 4.42, Rotation2d::from_degrees(180.0));
        let mid = Pose2d::new(3.3, 4.42, Rotation2d::from_degrees(0.0));
        let end = Pose2d::new(3.9, 2.75, Rotation2d::from_degrees(-90.0));
        let facing = Rotation2d::from_degrees(180.0);
        Self {
            routine: AutoRoutine::default(),
            blue_start: start,
            red_start: Pose2d::new(1.85, 3.6, Rotation2d::from_degrees(180.0)),
            balance_path: vec![
                TrajectoryState {
                    holonomic_rotation: facing,
                    ..TrajectoryState::at(0.0, start.with_rotation(Rotation2d::ZERO), 0.0)
                },
                TrajectoryState {
                    holonomic_rotation: facing,
                    ..TrajectoryState::at(1.2, mid, 1.5)
                },
                TrajectoryState {
                    holonomic_rotation: facing,
                    ..TrajectoryState::at(2.6, end, 0.0)
                },
            ],
            move_back_secs: 4.92,
        }
    }
}

impl AutoConfig {
    pub fn balance_trajectory(&self) -> Result<Trajectory, TrajectoryError> {
        Trajectory::new(self.balance_path.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub alliance: Alliance,
    pub drive: DriveConfig,
    pub estimator: EstimatorConfig,
    pub vision: VisionConfig,
    pub intake: IntakeConfig,
    pub wheels: WheelsConfig,
    pub elevator: ElevatorConfig,
    pub gripper: GripperConfig,
    pub climb: ClimbConfig,
    pub auto: AutoConfig,
}

impl RobotConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = serde_json::from_str(json)?;
        config.auto.balance_trajectory()?;
        Ok(config)
    }
}
