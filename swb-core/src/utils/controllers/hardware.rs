//! Contracts for the hardware the core drives but does not implement.
//!
//! Closed-loop module control, gyro fusion and motor drivers live behind these
//! traits; the core only exchanges setpoints and measurements with them.

use embedded_hal::digital::OutputPin;

use crate::utils::math::{
    geometry::Rotation2d,
    kinematics::{ModulePosition, ModuleState},
};

/// One swerve module: drive wheel plus steering.
pub trait SwerveModule {
    fn set_desired_state(
        &mut self,
        state: ModuleState,
    );

    /// Accumulated wheel distance and current steering angle.
    fn position(&self) -> ModulePosition;

    fn state(&self) -> ModuleState;

    /// Runs once per tick before odometry samples the module.
    fn periodic(&mut self) {}
}

/// Gyro / accelerometer unit.
pub trait Imu {
    /// Yaw, counter-clockwise positive.
    fn heading(&self) -> Rotation2d;

    /// Forward acceleration (g), used as a tilt proxy when balancing.
    fn accel_x(&self) -> f32;
}

/// An open-loop actuator with an encoder and current sense.
pub trait Motor {
    /// Duty in `[-1, 1]`; servo-style actuators take their raw position here.
    fn set(
        &mut self,
        output: f32,
    );

    fn position(&self) -> f32;

    /// Stator current (A).
    fn current(&self) -> f32 {
        0.0
    }
}

/// Drive a digital output, logging instead of failing on a pin error.
pub(crate) fn write_pin<P: OutputPin>(
    pin: &mut P,
    high: bool,
    name: &'static str,
) {
    let result = if high { pin.set_high() } else { pin.set_low() };
    if let Err(error) = result {
        tracing::warn!(?error, pin = name, "Pin write failed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::{Imu, Motor, SwerveModule};
    use crate::utils::math::{
        geometry::Rotation2d,
        kinematics::{ModulePosition, ModuleState},
    };

    /// Motor whose output and feedback are shared with the test through `Rc`s.
    #[derive(Clone, Default)]
    pub struct FakeMotor {
        pub output: Rc<Cell<f32>>,
        pub position: Rc<Cell<f32>>,
        pub current: Rc<Cell<f32>>,
    }

    impl Motor for FakeMotor {
        fn set(
            &mut self,
            output: f32,
        ) {
            self.output.set(output);
        }

        fn position(&self) -> f32 {
            self.position.get()
        }

        fn current(&self) -> f32 {
            self.current.get()
        }
    }

    /// Module that reports whatever distance the test writes and records its last target.
    #[derive(Clone, Default)]
    pub struct FakeModule {
        pub distance: Rc<Cell<f32>>,
        pub target: Rc<Cell<ModuleState>>,
    }

    impl SwerveModule for FakeModule {
        fn set_desired_state(
            &mut self,
            state: ModuleState,
        ) {
            self.target.set(state);
        }

        fn position(&self) -> ModulePosition {
            ModulePosition::new(self.distance.get(), self.target.get().angle)
        }

        fn state(&self) -> ModuleState {
            self.target.get()
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeImu {
        pub heading: Rc<Cell<Rotation2d>>,
        pub accel_x: Rc<Cell<f32>>,
    }

    impl Imu for FakeImu {
        fn heading(&self) -> Rotation2d {
            self.heading.get()
        }

        fn accel_x(&self) -> f32 {
            self.accel_x.get()
        }
    }
}
