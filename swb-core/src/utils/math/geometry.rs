//! Planar geometry for field-relative robot poses.
//!
//! Distances are metres, angles are radians measured counter-clockwise from
//! the field +X axis. Rotations are always kept wrapped to `[-π, π]`.
//!
//! # Example
//! ```rust
//! use swb_core::utils::math::geometry::{Pose2d, Rotation2d, Twist2d};
//! let start = Pose2d::new(1.0, 2.0, Rotation2d::ZERO);
//! let end = start.exp(Twist2d::new(1.0, 0.0, 0.0));
//! assert!((end.x() - 2.0).abs() < 1e-6);
//! ```

use core::f32::consts::PI;
use core::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

const SMALL: f32 = 1e-6;

/// Wrap an angle in radians into `[-π, π]`.
pub fn wrap_angle(radians: f32) -> f32 {
    libm::remainderf(radians, 2.0 * PI)
}

/// A heading on the field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rotation2d {
    radians: f32,
}

impl Rotation2d {
    pub const ZERO: Rotation2d = Rotation2d { radians: 0.0 };

    pub fn from_radians(radians: f32) -> Self {
        Self {
            radians: wrap_angle(radians),
        }
    }

    pub fn from_degrees(degrees: f32) -> Self {
        Self::from_radians(degrees.to_radians())
    }

    /// Heading of the vector `(x, y)`.
    pub fn from_components(
        x: f32,
        y: f32,
    ) -> Self {
        Self::from_radians(libm::atan2f(y, x))
    }

    pub fn radians(self) -> f32 {
        self.radians
    }

    pub fn degrees(self) -> f32 {
        self.radians.to_degrees()
    }

    pub fn cos(self) -> f32 {
        libm::cosf(self.radians)
    }

    pub fn sin(self) -> f32 {
        libm::sinf(self.radians)
    }

    /// Shortest-path interpolation toward `end`.
    pub fn interpolate(
        self,
        end: Rotation2d,
        t: f32,
    ) -> Rotation2d {
        let t = t.clamp(0.0, 1.0);
        self + Rotation2d::from_radians((end - self).radians * t)
    }
}

impl Add for Rotation2d {
    type Output = Rotation2d;

    fn add(
        self,
        rhs: Rotation2d,
    ) -> Rotation2d {
        Rotation2d::from_radians(self.radians + rhs.radians)
    }
}

impl Sub for Rotation2d {
    type Output = Rotation2d;

    fn sub(
        self,
        rhs: Rotation2d,
    ) -> Rotation2d {
        Rotation2d::from_radians(self.radians - rhs.radians)
    }
}

impl Neg for Rotation2d {
    type Output = Rotation2d;

    fn neg(self) -> Rotation2d {
        Rotation2d::from_radians(-self.radians)
    }
}

/// A field position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation2d {
    pub x: f32,
    pub y: f32,
}

impl Translation2d {
    pub const fn new(
        x: f32,
        y: f32,
    ) -> Self {
        Self { x, y }
    }

    pub fn norm(self) -> f32 {
        libm::hypotf(self.x, self.y)
    }

    pub fn distance(
        self,
        other: Translation2d,
    ) -> f32 {
        (self - other).norm()
    }

    pub fn rotate_by(
        self,
        rotation: Rotation2d,
    ) -> Translation2d {
        let (c, s) = (rotation.cos(), rotation.sin());
        Translation2d::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    pub fn interpolate(
        self,
        end: Translation2d,
        t: f32,
    ) -> Translation2d {
        let t = t.clamp(0.0, 1.0);
        self + (end - self) * t
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Translation2d {
    type Output = Translation2d;

    fn add(
        self,
        rhs: Translation2d,
    ) -> Translation2d {
        Translation2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Translation2d {
    type Output = Translation2d;

    fn sub(
        self,
        rhs: Translation2d,
    ) -> Translation2d {
        Translation2d::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Translation2d {
    type Output = Translation2d;

    fn mul(
        self,
        rhs: f32,
    ) -> Translation2d {
        Translation2d::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Translation2d {
    type Output = Translation2d;

    fn neg(self) -> Translation2d {
        Translation2d::new(-self.x, -self.y)
    }
}

/// A displacement along a constant-curvature arc, expressed in the robot frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist2d {
    pub dx: f32,
    pub dy: f32,
    pub dtheta: f32,
}

impl Twist2d {
    pub const fn new(
        dx: f32,
        dy: f32,
        dtheta: f32,
    ) -> Self {
        Self { dx, dy, dtheta }
    }
}

/// Position and heading of the robot on the field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    pub translation: Translation2d,
    pub rotation: Rotation2d,
}

impl Pose2d {
    pub fn new(
        x: f32,
        y: f32,
        rotation: Rotation2d,
    ) -> Self {
        Self {
            translation: Translation2d::new(x, y),
            rotation,
        }
    }

    pub fn x(&self) -> f32 {
        self.translation.x
    }

    pub fn y(&self) -> f32 {
        self.translation.y
    }

    pub fn with_rotation(
        &self,
        rotation: Rotation2d,
    ) -> Pose2d {
        Pose2d {
            translation: self.translation,
            rotation,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.radians().is_finite()
    }

    /// Apply a robot-frame offset and rotation to this pose.
    pub fn transform_by(
        &self,
        translation: Translation2d,
        rotation: Rotation2d,
    ) -> Pose2d {
        Pose2d {
            translation: self.translation + translation.rotate_by(self.rotation),
            rotation: self.rotation + rotation,
        }
    }

    /// Express this pose in the frame of `other`.
    pub fn relative_to(
        &self,
        other: &Pose2d,
    ) -> Pose2d {
        Pose2d {
            translation: (self.translation - other.translation).rotate_by(-other.rotation),
            rotation: self.rotation - other.rotation,
        }
    }

    /// Integrate a twist along a constant-curvature arc starting at this pose.
    pub fn exp(
        &self,
        twist: Twist2d,
    ) -> Pose2d {
        let Twist2d { dx, dy, dtheta } = twist;
        let sin_theta = libm::sinf(dtheta);
        let cos_theta = libm::cosf(dtheta);

        let (s, c) = if libm::fabsf(dtheta) < SMALL {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        self.transform_by(
            Translation2d::new(dx * s - dy * c, dx * c + dy * s),
            Rotation2d::from_components(cos_theta, sin_theta),
        )
    }

    /// The twist that carries this pose onto `end`; inverse of [`Pose2d::exp`].
    pub fn log(
        &self,
        end: &Pose2d,
    ) -> Twist2d {
        let transform = end.relative_to(self);
        let dtheta = transform.rotation.radians();
        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = transform.rotation.cos() - 1.0;

        let half_theta_by_tan = if libm::fabsf(cos_minus_one) < SMALL {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * transform.rotation.sin()) / cos_minus_one
        };

        let part = transform
            .translation
            .rotate_by(Rotation2d::from_components(half_theta_by_tan, -half_dtheta))
            * libm::hypotf(half_theta_by_tan, half_dtheta);

        Twist2d::new(part.x, part.y, dtheta)
    }

    /// Interpolate along the arc joining this pose and `end`.
    pub fn interpolate(
        &self,
        end: &Pose2d,
        t: f32,
    ) -> Pose2d {
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *end;
        }
        let twist = self.log(end);
        self.exp(Twist2d::new(twist.dx * t, twist.dy * t, twist.dtheta * t))
    }
}
