//! Kinematics utilities for N-module swerve drivetrains.
//!
//! The `SwerveKinematics` struct maps a desired chassis velocity onto per-module
//! speed and angle targets, and inverts measured module motion back to a chassis
//! displacement for odometry.
//!
//! # Example
//! ```rust
//! use swb_core::utils::math::geometry::Translation2d;
//! use swb_core::utils::math::kinematics::{ChassisSpeeds, SwerveKinematics};
//! let kin = SwerveKinematics::new([
//!     Translation2d::new(0.3, 0.3),
//!     Translation2d::new(0.3, -0.3),
//!     Translation2d::new(-0.3, 0.3),
//!     Translation2d::new(-0.3, -0.3),
//! ]);
//! let states = kin.to_module_states(ChassisSpeeds::new(1.0, 0.0, 0.0));
//! assert!((states[0].speed - 1.0).abs() < 1e-6);
//! ```
//!
use super::geometry::{Rotation2d, Translation2d, Twist2d};

/// Chassis velocity: `vx`/`vy` in m/s, `omega` in rad/s (CCW positive).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisSpeeds {
    pub vx: f32,
    pub vy: f32,
    pub omega: f32,
}

impl ChassisSpeeds {
    pub const fn new(
        vx: f32,
        vy: f32,
        omega: f32,
    ) -> Self {
        Self { vx, vy, omega }
    }

    /// Convert a field-relative request into the robot frame given the robot heading.
    pub fn from_field_relative(
        vx: f32,
        vy: f32,
        omega: f32,
        heading: Rotation2d,
    ) -> Self {
        let robot = Translation2d::new(vx, vy).rotate_by(-heading);
        Self::new(robot.x, robot.y, omega)
    }

    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }
}

/// Target for one module: wheel speed (m/s) and steering angle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleState {
    pub speed: f32,
    pub angle: Rotation2d,
}

/// Measured state of one module: accumulated wheel distance (m) and steering angle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModulePosition {
    pub distance: f32,
    pub angle: Rotation2d,
}

impl ModulePosition {
    pub const fn new(
        distance: f32,
        angle: Rotation2d,
    ) -> Self {
        Self { distance, angle }
    }

    pub fn interpolate(
        &self,
        end: &ModulePosition,
        t: f32,
    ) -> ModulePosition {
        let t = t.clamp(0.0, 1.0);
        ModulePosition {
            distance: self.distance + (end.distance - self.distance) * t,
            angle: self.angle.interpolate(end.angle, t),
        }
    }
}

/// Represents the kinematics of a swerve drivetrain with `N` modules.
#[derive(Debug, Clone)]
pub struct SwerveKinematics<const N: usize> {
    /// Module mounting points relative to the robot centre (m)
    locations: [Translation2d; N],
    /// Inverse of the forward-kinematics normal matrix, `None` when singular
    normal_inverse: Option<[[f32; 3]; 3]>,
}

impl<const N: usize> SwerveKinematics<N> {
    /// Instantiate with module locations relative to the robot centre.
    pub fn new(locations: [Translation2d; N]) -> Self {
        let normal_inverse = invert_3x3(Self::construct_normal(&locations));
        Self {
            locations,
            normal_inverse,
        }
    }

    pub fn locations(&self) -> &[Translation2d; N] {
        &self.locations
    }

    /// Build AᵀA where A stacks `[1, 0, -y; 0, 1, x]` for each module.
    fn construct_normal(locations: &[Translation2d; N]) -> [[f32; 3]; 3] {
        let n = N as f32;
        let (mut sx, mut sy, mut sr) = (0.0, 0.0, 0.0);
        for l in locations {
            sx += l.x;
            sy += l.y;
            sr += l.x * l.x + l.y * l.y;
        }
        [[n, 0.0, -sy], [0.0, n, sx], [-sy, sx, sr]]
    }

    /// Compute the per-module targets that realise `speeds`.
    ///
    /// A module with zero resulting speed reports angle zero; holding the previous
    /// steering angle is left to the drivetrain.
    pub fn to_module_states(
        &self,
        speeds: ChassisSpeeds,
    ) -> [ModuleState; N] {
        core::array::from_fn(|i| {
            let l = self.locations[i];
            let vx = speeds.vx - speeds.omega * l.y;
            let vy = speeds.vy + speeds.omega * l.x;
            let speed = libm::hypotf(vx, vy);
            let angle = if speed > 0.0 {
                Rotation2d::from_components(vx, vy)
            } else {
                Rotation2d::ZERO
            };
            ModuleState { speed, angle }
        })
    }

    /// Least-squares chassis velocity from measured module states.
    pub fn to_chassis_speeds(
        &self,
        states: &[ModuleState; N],
    ) -> ChassisSpeeds {
        let (vx, vy, omega) = self.solve(core::array::from_fn(|i| {
            (
                states[i].speed * states[i].angle.cos(),
                states[i].speed * states[i].angle.sin(),
            )
        }));
        ChassisSpeeds::new(vx, vy, omega)
    }

    /// Least-squares chassis displacement from per-module distance deltas.
    pub fn to_twist(
        &self,
        deltas: &[ModulePosition; N],
    ) -> Twist2d {
        let (dx, dy, dtheta) = self.solve(core::array::from_fn(|i| {
            (
                deltas[i].distance * deltas[i].angle.cos(),
                deltas[i].distance * deltas[i].angle.sin(),
            )
        }));
        Twist2d::new(dx, dy, dtheta)
    }

    fn solve(
        &self,
        components: [(f32, f32); N],
    ) -> (f32, f32, f32) {
        let Some(inv) = self.normal_inverse else {
            return (0.0, 0.0, 0.0);
        };
        let mut atb = [0.0_f32; 3];
        for (l, (bx, by)) in self.locations.iter().zip(components) {
            atb[0] += bx;
            atb[1] += by;
            atb[2] += -l.y * bx + l.x * by;
        }
        let row = |r: usize| inv[r][0] * atb[0] + inv[r][1] * atb[1] + inv[r][2] * atb[2];
        (row(0), row(1), row(2))
    }
}

/// Scale every module speed down uniformly so none exceeds `max_speed`.
///
/// The fastest module ends up at exactly `max_speed`; ratios between modules
/// are preserved.
pub fn desaturate_wheel_speeds<const N: usize>(
    states: &mut [ModuleState; N],
    max_speed: f32,
) {
    let real_max = states
        .iter()
        .map(|s| libm::fabsf(s.speed))
        .fold(0.0_f32, f32::max);
    if real_max > max_speed {
        for s in states.iter_mut() {
            s.speed = s.speed / real_max * max_speed;
        }
    }
}

/// Invert a 3×3 matrix using cofactor expansion.
///
/// Returns `None` if the matrix is singular.
fn invert_3x3(m: [[f32; 3]; 3]) -> Option<[[f32; 3]; 3]> {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    if libm::fabsf(det) < 1e-9 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            -(m[0][1] * m[2][2] - m[0][2] * m[2][1]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            -(m[1][0] * m[2][2] - m[1][2] * m[2][0]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            -(m[0][0] * m[1][2] - m[0][2] * m[1][0]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            -(m[0][0] * m[2][1] - m[0][1] * m[2][0]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> SwerveKinematics<4> {
        SwerveKinematics::new([
            Translation2d::new(0.3, 0.3),
            Translation2d::new(0.3, -0.3),
            Translation2d::new(-0.3, 0.3),
            Translation2d::new(-0.3, -0.3),
        ])
    }

    #[test]
    fn test_invert_3x3_identity() {
        let id = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let inv = invert_3x3(id).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert!((inv[i][j] - id[i][j]).abs() < 1e-6, "inv != id at {}:{}", i, j);
            }
        }
    }

    #[test]
    fn test_invert_3x3_singular() {
        assert!(invert_3x3([[0.0; 3]; 3]).is_none());
    }

    #[test]
    fn test_pure_rotation_module_angles() {
        let states = square().to_module_states(ChassisSpeeds::new(0.0, 0.0, 1.0));
        // Front-left module at (+x, +y) moves toward +y/-x when spinning CCW.
        assert!((states[0].angle.degrees() - 135.0).abs() < 1e-3);
        for s in states {
            assert!((s.speed - libm::hypotf(0.3, 0.3)).abs() < 1e-5);
        }
    }

    #[test]
    fn test_field_relative_conversion() {
        let speeds = ChassisSpeeds::from_field_relative(1.0, 0.0, 0.0, Rotation2d::from_degrees(90.0));
        assert!(speeds.vx.abs() < 1e-6);
        assert!((speeds.vy + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_round_trip_chassis_speeds() {
        let kin = square();
        let request = ChassisSpeeds::new(1.2, -0.4, 0.7);
        let back = kin.to_chassis_speeds(&kin.to_module_states(request));
        assert!((back.vx - request.vx).abs() < 1e-4);
        assert!((back.vy - request.vy).abs() < 1e-4);
        assert!((back.omega - request.omega).abs() < 1e-4);
    }

    #[test]
    fn test_forward_twist_from_equal_deltas() {
        let deltas = [ModulePosition::new(1.0, Rotation2d::ZERO); 4];
        let twist = square().to_twist(&deltas);
        assert!((twist.dx - 1.0).abs() < 1e-6);
        assert!(twist.dy.abs() < 1e-6);
        assert!(twist.dtheta.abs() < 1e-6);
    }

    #[test]
    fn test_no_modules_gives_zero_twist() {
        let kin = SwerveKinematics::<0>::new([]);
        assert_eq!(kin.to_twist(&[]), Twist2d::default());
    }

    #[test]
    fn test_desaturate_preserves_ratios() {
        let mut states = [
            ModuleState { speed: 8.0, angle: Rotation2d::ZERO },
            ModuleState { speed: -4.0, angle: Rotation2d::ZERO },
            ModuleState { speed: 2.0, angle: Rotation2d::ZERO },
            ModuleState { speed: 6.0, angle: Rotation2d::ZERO },
        ];
        desaturate_wheel_speeds(&mut states, 4.0);
        assert_eq!(states[0].speed, 4.0);
        assert!((states[1].speed + 2.0).abs() < 1e-6);
        assert!((states[2].speed - 1.0).abs() < 1e-6);
        assert!((states[3].speed - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_desaturate_leaves_slow_modules() {
        let mut states = [ModuleState { speed: 1.0, angle: Rotation2d::ZERO }; 4];
        desaturate_wheel_speeds(&mut states, 4.0);
        assert!(states.iter().all(|s| s.speed == 1.0));
    }
}
