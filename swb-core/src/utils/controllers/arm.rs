use embedded_hal::digital::OutputPin;

use super::{hardware::write_pin, Owns, Resource, ResourceSet, Subsystem};
use crate::utils::command::Command;

/// Pneumatic pivot that swings the gripper out over the grid.
pub struct PivotArm<P> {
    pin: P,
    extended: bool,
}

impl<P: OutputPin + 'static> PivotArm<P> {
    pub fn new(pin: P) -> Self {
        let mut arm = Self { pin, extended: false };
        arm.set_extended(false);
        arm
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn set_extended(
        &mut self,
        extended: bool,
    ) {
        self.extended = extended;
        write_pin(&mut self.pin, extended, "pivot");
    }

    pub fn pivot<C: Owns<Self> + 'static>(extended: bool) -> Command<C> {
        Command::run_once("arm_pivot", ResourceSet::of(Resource::Arm), move |c: &mut C| {
            c.subsystem_mut().set_extended(extended)
        })
    }
}

impl<P: OutputPin> Subsystem for PivotArm<P> {
    fn resource(&self) -> Option<Resource> {
        Some(Resource::Arm)
    }
}
