//! Buddy climb: releases a ramp for a partner robot, then winches on demand.

use alloc::boxed::Box;

use embassy_time::{Duration, Instant};
use serde::{Deserialize, Serialize};

use super::{Motor, Owns, Resource, ResourceSet, Subsystem};
use crate::utils::{command::Command, math::from_secs};

const CLIMB: ResourceSet = ResourceSet::of(Resource::Climb);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimbConfig {
    /// Raw servo value that releases the ramp latch
    pub servo_release: f32,
    pub servo_rest: f32,
    /// How long the servo is held at release (s)
    pub release_secs: f32,
    pub max_output: f32,
}

impl Default for ClimbConfig {
    fn default() -> Self {
        Self {
            servo_release: 1.0,
            servo_rest: 0.0,
            release_secs: 15.0,
            max_output: 1.0,
        }
    }
}

pub struct BuddyClimb {
    servo: Box<dyn Motor>,
    motors: Box<dyn Motor>,
    active: bool,
    demand: f32,
    config: ClimbConfig,
}

impl BuddyClimb {
    pub fn new(
        servo: Box<dyn Motor>,
        motors: Box<dyn Motor>,
        config: &ClimbConfig,
    ) -> Self {
        Self {
            servo,
            motors,
            active: false,
            demand: 0.0,
            config: config.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Manual winch demand; only applied once the climb is active.
    pub fn set_demand(
        &mut self,
        demand: f32,
    ) {
        self.demand = if demand.is_finite() { demand } else { 0.0 };
    }

    fn release_servo(
        &mut self,
        release: bool,
    ) {
        let value = if release {
            self.config.servo_release
        } else {
            self.config.servo_rest
        };
        self.servo.set(value);
    }

    pub fn release_time(&self) -> Duration {
        from_secs(self.config.release_secs)
    }

    /// Arm the climb, hold the latch servo open for `hold`, then rest it.
    pub fn activate<C: Owns<Self> + 'static>(hold: Duration) -> Command<C> {
        let release = |c: &mut C| {
            let climb = c.subsystem_mut();
            tracing::info!("Buddy climb activated");
            climb.active = true;
            climb.release_servo(true);
        };
        let rest = |c: &mut C| c.subsystem_mut().release_servo(false);
        Command::run_once("climb_release", CLIMB, release)
            .and_then(Command::wait(hold))
            .and_then(Command::run_once("climb_rest", CLIMB, rest))
            .with_name("climb_activate")
    }
}

impl Subsystem for BuddyClimb {
    fn resource(&self) -> Option<Resource> {
        Some(Resource::Climb)
    }

    fn periodic(
        &mut self,
        _now: Instant,
    ) {
        let output = if self.active {
            self.demand.clamp(-self.config.max_output, self.config.max_output)
        } else {
            0.0
        };
        self.motors.set(output);
    }
}
