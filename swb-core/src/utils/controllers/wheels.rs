//! Intake rollers: speed levels for collecting, holding and launching.

use alloc::boxed::Box;

use embassy_time::Instant;
use serde::{Deserialize, Serialize};

use super::{Motor, Owns, Resource, ResourceSet, Subsystem};
use crate::utils::command::{Command, Finish};

const WHEELS: ResourceSet = ResourceSet::of(Resource::Wheels);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelSpeed {
    Off,
    Intake,
    Hold,
    First,
    Second,
    Third,
}

impl WheelSpeed {
    pub fn is_launch(self) -> bool {
        matches!(self, WheelSpeed::First | WheelSpeed::Second | WheelSpeed::Third)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelsConfig {
    pub intake: f32,
    pub hold: f32,
    pub first: f32,
    pub second: f32,
    pub third: f32,
    /// Roller current (A) above which a piece is considered collected
    pub stall_current: f32,
}

impl Default for WheelsConfig {
    fn default() -> Self {
        Self {
            intake: -0.6,
            hold: -0.1,
            first: 0.3,
            second: 0.55,
            third: 0.85,
            stall_current: 25.0,
        }
    }
}

pub struct Wheels {
    motor: Box<dyn Motor>,
    speed: WheelSpeed,
    target_level: WheelSpeed,
    has_piece: bool,
    config: WheelsConfig,
}

impl Wheels {
    pub fn new(
        motor: Box<dyn Motor>,
        config: &WheelsConfig,
    ) -> Self {
        Self {
            motor,
            speed: WheelSpeed::Off,
            target_level: WheelSpeed::Second,
            has_piece: false,
            config: config.clone(),
        }
    }

    pub fn speed(&self) -> WheelSpeed {
        self.speed
    }

    pub fn set_speed(
        &mut self,
        speed: WheelSpeed,
    ) {
        if speed.is_launch() {
            self.has_piece = false;
        }
        self.speed = speed;
    }

    pub fn target_level(&self) -> WheelSpeed {
        self.target_level
    }

    /// Remember the level a later [`Wheels::launch`] should use.
    pub fn set_target_level(
        &mut self,
        level: WheelSpeed,
    ) {
        self.target_level = level;
    }

    pub fn launch(&mut self) {
        self.set_speed(self.target_level);
    }

    pub fn has_piece(&self) -> bool {
        self.has_piece
    }

    fn output(&self) -> f32 {
        match self.speed {
            WheelSpeed::Off => 0.0,
            WheelSpeed::Intake => self.config.intake,
            WheelSpeed::Hold => self.config.hold,
            WheelSpeed::First => self.config.first,
            WheelSpeed::Second => self.config.second,
            WheelSpeed::Third => self.config.third,
        }
    }

    pub fn set_speed_command<C: Owns<Self> + 'static>(speed: WheelSpeed) -> Command<C> {
        Command::run_once("wheels_set_speed", WHEELS, move |c: &mut C| {
            c.subsystem_mut().set_speed(speed)
        })
    }

    pub fn target_level_command<C: Owns<Self> + 'static>(level: WheelSpeed) -> Command<C> {
        Command::run_once("wheels_target_level", WHEELS, move |c: &mut C| {
            c.subsystem_mut().set_target_level(level)
        })
    }

    pub fn launch_to<C: Owns<Self> + 'static>() -> Command<C> {
        Command::run_once("wheels_launch", WHEELS, |c: &mut C| c.subsystem_mut().launch())
    }

    /// Spin in until the rollers stall on a piece.
    pub fn intake_until_piece<C: Owns<Self> + 'static>() -> Command<C> {
        Command::functional(
            "wheels_intake",
            WHEELS,
            |c: &mut C| c.subsystem_mut().set_speed(WheelSpeed::Intake),
            |_| {},
            |_, _| {},
            Finish::When(Box::new(|c: &C| c.subsystem().has_piece())),
        )
    }
}

impl Subsystem for Wheels {
    fn resource(&self) -> Option<Resource> {
        Some(Resource::Wheels)
    }

    fn periodic(
        &mut self,
        _now: Instant,
    ) {
        if self.speed == WheelSpeed::Intake && self.motor.current() > self.config.stall_current {
            tracing::debug!(current = self.motor.current(), "Game piece collected");
            self.has_piece = true;
            self.speed = WheelSpeed::Hold;
        }
        let output = self.output();
        self.motor.set(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::controllers::hardware::testing::FakeMotor;

    #[test]
    fn stall_while_intaking_switches_to_hold() {
        let motor = FakeMotor::default();
        let mut wheels = Wheels::new(Box::new(motor.clone()), &WheelsConfig::default());
        wheels.set_speed(WheelSpeed::Intake);
        wheels.periodic(Instant::from_millis(0));
        assert_eq!(motor.output.get(), -0.6);

        motor.current.set(40.0);
        wheels.periodic(Instant::from_millis(20));
        assert!(wheels.has_piece());
        assert_eq!(wheels.speed(), WheelSpeed::Hold);
        assert_eq!(motor.output.get(), -0.1);
    }

    #[test]
    fn launch_uses_remembered_level() {
        let motor = FakeMotor::default();
        let mut wheels = Wheels::new(Box::new(motor.clone()), &WheelsConfig::default());
        wheels.set_target_level(WheelSpeed::Third);
        wheels.set_speed(WheelSpeed::Hold);
        wheels.launch();
        wheels.periodic(Instant::from_millis(0));
        assert_eq!(wheels.speed(), WheelSpeed::Third);
        assert_eq!(motor.output.get(), 0.85);
        assert!(!wheels.has_piece());
    }
}
