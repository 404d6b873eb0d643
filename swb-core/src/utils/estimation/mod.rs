//! Localization: wheel odometry and its fusion with vision.
//!
//! - `odometry`: dead-reckoning from module distance deltas and the gyro
//! - `pose_estimator`: delay-compensated fusion of odometry with timestamped vision poses

pub mod odometry;
pub mod pose_estimator;

use embassy_time::Instant;

use crate::utils::math::geometry::Pose2d;

/// A field pose reported by the camera, stamped with its capture time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionMeasurement {
    pub pose: Pose2d,
    pub timestamp: Instant,
}

pub use odometry::SwerveOdometry;
pub use pose_estimator::{EstimatorConfig, PoseEstimator};
