use crate::utils::math::{
    geometry::{Pose2d, Rotation2d, Translation2d},
    kinematics::{ModulePosition, SwerveKinematics},
};

/// Integrates module distance deltas into a field pose.
///
/// Heading always comes from the gyro (plus the offset captured at the last
/// reset); the kinematics only contribute translation.
#[derive(Debug, Clone)]
pub struct SwerveOdometry<const N: usize> {
    kinematics: SwerveKinematics<N>,
    pose: Pose2d,
    gyro_offset: Rotation2d,
    previous_angle: Rotation2d,
    previous_positions: [ModulePosition; N],
}

impl<const N: usize> SwerveOdometry<N> {
    pub fn new(
        kinematics: SwerveKinematics<N>,
        gyro: Rotation2d,
        positions: [ModulePosition; N],
        initial_pose: Pose2d,
    ) -> Self {
        Self {
            kinematics,
            pose: initial_pose,
            gyro_offset: initial_pose.rotation - gyro,
            previous_angle: initial_pose.rotation,
            previous_positions: positions,
        }
    }

    pub fn kinematics(&self) -> &SwerveKinematics<N> {
        &self.kinematics
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Re-anchor the integration at `pose` given the current sensor readings.
    pub fn reset_position(
        &mut self,
        gyro: Rotation2d,
        positions: [ModulePosition; N],
        pose: Pose2d,
    ) {
        self.pose = pose;
        self.previous_angle = pose.rotation;
        self.gyro_offset = pose.rotation - gyro;
        self.previous_positions = positions;
    }

    /// Move the pose to `translation` without touching heading or the sensor baseline.
    pub fn reset_translation(
        &mut self,
        translation: Translation2d,
    ) {
        self.pose.translation = translation;
    }

    /// Advance by the motion since the previous update. Non-finite readings are
    /// dropped and the pose is left where it was.
    pub fn update(
        &mut self,
        gyro: Rotation2d,
        positions: [ModulePosition; N],
    ) -> Pose2d {
        let finite = gyro.radians().is_finite()
            && positions
                .iter()
                .all(|p| p.distance.is_finite() && p.angle.radians().is_finite());
        if !finite {
            return self.pose;
        }

        let angle = gyro + self.gyro_offset;
        let deltas: [ModulePosition; N] = core::array::from_fn(|i| {
            ModulePosition::new(
                positions[i].distance - self.previous_positions[i].distance,
                positions[i].angle,
            )
        });

        let mut twist = self.kinematics.to_twist(&deltas);
        twist.dtheta = (angle - self.previous_angle).radians();

        let next = self.pose.exp(twist);
        self.previous_angle = angle;
        self.previous_positions = positions;
        self.pose = next.with_rotation(angle);
        self.pose
    }
}
