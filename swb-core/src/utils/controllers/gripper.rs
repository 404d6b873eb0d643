//! Cone gripper: a pneumatic claw plus a winch that sets the wrist angle.

use alloc::boxed::Box;

use embassy_time::Instant;
use embedded_hal::digital::OutputPin;
use serde::{Deserialize, Serialize};

use super::{hardware::write_pin, Motor, Owns, Resource, ResourceSet, Subsystem};
use crate::utils::{
    command::Command,
    math::pid::{PidController, PidGains},
};

const GRIPPER: ResourceSet = ResourceSet::of(Resource::Gripper);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claw {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinchPosition {
    Default,
    Released,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperConfig {
    pub winch_default: f32,
    pub winch_released: f32,
    pub pid: PidGains,
    pub max_output: f32,
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            winch_default: 0.0,
            winch_released: -18.0,
            pid: PidGains::new(0.12, 0.0, 0.0),
            max_output: 0.5,
        }
    }
}

pub struct Gripper<P> {
    claw_pin: P,
    winch: Box<dyn Motor>,
    pid: PidController,
    claw: Claw,
    winch_target: WinchPosition,
    config: GripperConfig,
}

impl<P: OutputPin + 'static> Gripper<P> {
    pub fn new(
        claw_pin: P,
        winch: Box<dyn Motor>,
        config: &GripperConfig,
        dt: f32,
    ) -> Self {
        let mut gripper = Self {
            claw_pin,
            winch,
            pid: PidController::new(config.pid, dt),
            claw: Claw::Closed,
            winch_target: WinchPosition::Default,
            config: config.clone(),
        };
        gripper.open(false);
        gripper
    }

    pub fn claw(&self) -> Claw {
        self.claw
    }

    /// Pin high opens the claw.
    pub fn open(
        &mut self,
        open: bool,
    ) {
        self.claw = if open { Claw::Open } else { Claw::Closed };
        write_pin(&mut self.claw_pin, open, "claw");
    }

    pub fn toggle(&mut self) {
        self.open(self.claw == Claw::Closed);
    }

    pub fn winch_target(&self) -> WinchPosition {
        self.winch_target
    }

    pub fn set_winch(
        &mut self,
        position: WinchPosition,
    ) {
        if position != self.winch_target {
            self.pid.reset();
        }
        self.winch_target = position;
    }

    fn winch_setpoint(&self) -> f32 {
        match self.winch_target {
            WinchPosition::Default => self.config.winch_default,
            WinchPosition::Released => self.config.winch_released,
        }
    }

    pub fn open_command<C: Owns<Self> + 'static>(open: bool) -> Command<C> {
        Command::run_once("gripper_open", GRIPPER, move |c: &mut C| c.subsystem_mut().open(open))
    }

    pub fn toggle_command<C: Owns<Self> + 'static>() -> Command<C> {
        Command::run_once("gripper_toggle", GRIPPER, |c: &mut C| c.subsystem_mut().toggle())
    }

    pub fn default_winch<C: Owns<Self> + 'static>() -> Command<C> {
        Command::run_once("gripper_default_winch", GRIPPER, |c: &mut C| {
            c.subsystem_mut().set_winch(WinchPosition::Default)
        })
    }
}

impl<P: OutputPin + 'static> Subsystem for Gripper<P> {
    fn resource(&self) -> Option<Resource> {
        Some(Resource::Gripper)
    }

    fn periodic(
        &mut self,
        _now: Instant,
    ) {
        let max = self.config.max_output;
        let output = self.pid.calculate(self.winch.position(), self.winch_setpoint());
        self.winch.set(output.clamp(-max, max));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::controllers::hardware::testing::FakeMotor;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};

    #[test]
    fn claw_writes_pin_on_every_change() {
        let pin = PinMock::new(&[
            Transaction::set(State::Low),
            Transaction::set(State::High),
            Transaction::set(State::Low),
        ]);
        let mut gripper = Gripper::new(pin.clone(), Box::new(FakeMotor::default()), &GripperConfig::default(), 0.02);
        gripper.open(true);
        assert_eq!(gripper.claw(), Claw::Open);
        gripper.toggle();
        assert_eq!(gripper.claw(), Claw::Closed);
        let mut pin = pin;
        pin.done();
    }

    #[test]
    fn winch_holds_target() {
        let winch = FakeMotor::default();
        let pin = PinMock::new(&[Transaction::set(State::Low)]);
        let mut gripper = Gripper::new(pin.clone(), Box::new(winch.clone()), &GripperConfig::default(), 0.02);
        gripper.set_winch(WinchPosition::Released);
        assert_eq!(gripper.winch_setpoint(), -18.0);
        gripper.periodic(Instant::from_millis(0));
        assert!((winch.output.get() + 0.5).abs() < 1e-6);
        let mut pin = pin;
        pin.done();
    }
}
