//! Intake pivot held at one of three angles by a PID loop.

use alloc::boxed::Box;

use embassy_time::Instant;
use serde::{Deserialize, Serialize};

use super::{Motor, Owns, Resource, ResourceSet, Subsystem};
use crate::utils::{
    command::Command,
    math::pid::{PidController, PidGains},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakePosition {
    Retracted,
    Deployed,
    Launch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Encoder setpoints (rotations)
    pub retracted: f32,
    pub deployed: f32,
    pub launch: f32,
    pub pid: PidGains,
    pub max_output: f32,
    pub tolerance: f32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            retracted: 0.0,
            deployed: 12.5,
            launch: 4.0,
            pid: PidGains::new(0.1, 0.0, 0.0),
            max_output: 0.6,
            tolerance: 0.5,
        }
    }
}

pub struct Intake {
    motor: Box<dyn Motor>,
    pid: PidController,
    target: IntakePosition,
    config: IntakeConfig,
}

impl Intake {
    pub fn new(
        motor: Box<dyn Motor>,
        config: &IntakeConfig,
        dt: f32,
    ) -> Self {
        Self {
            motor,
            pid: PidController::new(config.pid, dt),
            target: IntakePosition::Retracted,
            config: config.clone(),
        }
    }

    pub fn target(&self) -> IntakePosition {
        self.target
    }

    pub fn set_target(
        &mut self,
        target: IntakePosition,
    ) {
        if target != self.target {
            self.pid.reset();
        }
        self.target = target;
    }

    fn setpoint(&self) -> f32 {
        match self.target {
            IntakePosition::Retracted => self.config.retracted,
            IntakePosition::Deployed => self.config.deployed,
            IntakePosition::Launch => self.config.launch,
        }
    }

    pub fn at_target(&self) -> bool {
        libm::fabsf(self.motor.position() - self.setpoint()) <= self.config.tolerance
    }

    pub fn set_angle<C: Owns<Self> + 'static>(target: IntakePosition) -> Command<C> {
        Command::run_once("intake_set_angle", ResourceSet::of(Resource::Intake), move |c: &mut C| {
            c.subsystem_mut().set_target(target)
        })
    }
}

impl Subsystem for Intake {
    fn resource(&self) -> Option<Resource> {
        Some(Resource::Intake)
    }

    fn periodic(
        &mut self,
        _now: Instant,
    ) {
        let max = self.config.max_output;
        let output = self.pid.calculate(self.motor.position(), self.setpoint());
        self.motor.set(output.clamp(-max, max));
    }
}
