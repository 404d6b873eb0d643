//! Elevator carriage held at a named height.

use alloc::boxed::Box;

use embassy_time::Instant;
use serde::{Deserialize, Serialize};

use super::{Motor, Owns, Resource, ResourceSet, Subsystem};
use crate::utils::{
    command::{Command, Finish},
    math::pid::{PidController, PidGains},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevatorLevel {
    Down,
    Second,
    Third,
    Feeder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevatorConfig {
    pub down: f32,
    pub second: f32,
    pub third: f32,
    pub feeder: f32,
    pub pid: PidGains,
    pub max_output: f32,
    pub tolerance: f32,
}

impl Default for ElevatorConfig {
    fn default() -> Self {
        Self {
            down: 0.0,
            second: 28.0,
            third: 52.0,
            feeder: 40.0,
            pid: PidGains::new(0.08, 0.0, 0.0),
            max_output: 0.8,
            tolerance: 1.0,
        }
    }
}

pub struct Elevator {
    motor: Box<dyn Motor>,
    pid: PidController,
    target: ElevatorLevel,
    config: ElevatorConfig,
}

impl Elevator {
    pub fn new(
        motor: Box<dyn Motor>,
        config: &ElevatorConfig,
        dt: f32,
    ) -> Self {
        Self {
            motor,
            pid: PidController::new(config.pid, dt),
            target: ElevatorLevel::Down,
            config: config.clone(),
        }
    }

    pub fn target(&self) -> ElevatorLevel {
        self.target
    }

    pub fn set_target(
        &mut self,
        target: ElevatorLevel,
    ) {
        if target != self.target {
            self.pid.reset();
        }
        self.target = target;
    }

    pub fn height(&self) -> f32 {
        self.motor.position()
    }

    fn setpoint(&self) -> f32 {
        match self.target {
            ElevatorLevel::Down => self.config.down,
            ElevatorLevel::Second => self.config.second,
            ElevatorLevel::Third => self.config.third,
            ElevatorLevel::Feeder => self.config.feeder,
        }
    }

    pub fn at_setpoint(&self) -> bool {
        libm::fabsf(self.height() - self.setpoint()) <= self.config.tolerance
    }

    /// Move to `level`; finishes once the carriage is within tolerance.
    pub fn extend_to<C: Owns<Self> + 'static>(level: ElevatorLevel) -> Command<C> {
        Command::functional(
            "elevator_extend",
            ResourceSet::of(Resource::Elevator),
            move |c: &mut C| c.subsystem_mut().set_target(level),
            |_| {},
            |_, _| {},
            Finish::When(Box::new(|c: &C| c.subsystem().at_setpoint())),
        )
    }
}

impl Subsystem for Elevator {
    fn resource(&self) -> Option<Resource> {
        Some(Resource::Elevator)
    }

    fn periodic(
        &mut self,
        _now: Instant,
    ) {
        let max = self.config.max_output;
        let output = self.pid.calculate(self.height(), self.setpoint());
        self.motor.set(output.clamp(-max, max));
    }
}
