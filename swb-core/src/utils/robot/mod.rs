//! The robot context every command runs against.
//!
//! - `input`: operator controller snapshot
//! - `mode`: cube/cone game-piece mode and its transition command
//! - `sequences`: cross-subsystem choreography
//! - `autos`: selectable autonomous routines
//! - `container`: wiring of subsystems, default commands and bindings
//!
//! [`Robot`] owns every subsystem. Its [`Periodic`] impl is the per-tick
//! update: sensors first, then odometry, then the mechanisms, and finally the
//! newest vision pose is handed to the estimator.

pub mod autos;
pub mod container;
pub mod input;
pub mod mode;
pub mod sequences;

use alloc::{boxed::Box, sync::Arc};

use embassy_time::Instant;
use embedded_hal::digital::OutputPin;

use crate::utils::{
    command::Periodic,
    config::RobotConfig,
    connection::TopicBus,
    controllers::{
        arm::PivotArm, climb::BuddyClimb, drive::DriveTrain, elevator::Elevator,
        gripper::Gripper, indicator::Indicator, intake::Intake, vision::Vision, wheels::Wheels,
        Imu, Motor, Owns, ResourceSet, Subsystem, SwerveModule,
    },
    math::trajectory::Alliance,
};

pub use container::RobotContainer;
pub use input::{Button, ControllerState, OperatorInput};
pub use mode::GamePiece;

/// Number of swerve modules on the chassis.
pub const MODULE_COUNT: usize = 4;

/// Platform drivers handed to [`Robot::new`].
pub struct RobotHardware<P> {
    pub modules: [Box<dyn SwerveModule>; MODULE_COUNT],
    pub imu: Box<dyn Imu>,
    pub intake: Box<dyn Motor>,
    pub wheels: Box<dyn Motor>,
    pub elevator: Box<dyn Motor>,
    pub winch: Box<dyn Motor>,
    pub climb_servo: Box<dyn Motor>,
    pub climb_motors: Box<dyn Motor>,
    pub claw: P,
    pub pivot: P,
    pub indicator: [P; 3],
}

pub struct Robot<P> {
    pub drive: DriveTrain<MODULE_COUNT>,
    pub vision: Vision,
    pub intake: Intake,
    pub wheels: Wheels,
    pub elevator: Elevator,
    pub gripper: Gripper<P>,
    pub arm: PivotArm<P>,
    pub climb: BuddyClimb,
    pub indicator: Indicator<P>,
    pub input: OperatorInput,
    mode: GamePiece,
    now: Instant,
}

impl<P> Robot<P> {
    pub fn mode(&self) -> GamePiece {
        self.mode
    }

    fn apply_mode(
        &mut self,
        mode: GamePiece,
    ) {
        if mode != self.mode {
            tracing::info!(?mode, "Game piece mode changed");
        }
        self.mode = mode;
    }

    /// Time of the current tick.
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn alliance(&self) -> Alliance {
        self.drive.alliance()
    }

    pub fn is_blue(&self) -> bool {
        !self.alliance().is_red()
    }
}

impl<P: OutputPin + 'static> Robot<P> {
    pub fn new(
        hardware: RobotHardware<P>,
        bus: Arc<TopicBus>,
        config: &RobotConfig,
    ) -> Self {
        let dt = config.drive.tick_secs;
        let mut drive = DriveTrain::new(
            hardware.modules,
            hardware.imu,
            config.drive.module_locations,
            &config.drive,
            &config.estimator,
        );
        drive.set_alliance(config.alliance);
        Self {
            drive,
            vision: Vision::new(bus, &config.vision),
            intake: Intake::new(hardware.intake, &config.intake, dt),
            wheels: Wheels::new(hardware.wheels, &config.wheels),
            elevator: Elevator::new(hardware.elevator, &config.elevator, dt),
            gripper: Gripper::new(hardware.claw, hardware.winch, &config.gripper, dt),
            arm: PivotArm::new(hardware.pivot),
            climb: BuddyClimb::new(hardware.climb_servo, hardware.climb_motors, &config.climb),
            indicator: Indicator::new(hardware.indicator),
            input: OperatorInput::default(),
            mode: GamePiece::default(),
            now: Instant::from_ticks(0),
        }
    }

    /// Every subsystem in periodic order.
    fn subsystems(&mut self) -> [&mut dyn Subsystem; 9] {
        [
            &mut self.vision,
            &mut self.drive,
            &mut self.intake,
            &mut self.wheels,
            &mut self.elevator,
            &mut self.gripper,
            &mut self.arm,
            &mut self.climb,
            &mut self.indicator,
        ]
    }

    /// Resources some subsystem actuates; commands may only require these.
    pub fn owned_resources(&mut self) -> ResourceSet {
        self.subsystems()
            .iter()
            .filter_map(|s| s.resource())
            .fold(ResourceSet::EMPTY, ResourceSet::with)
    }
}

impl<P: OutputPin + 'static> Periodic for Robot<P> {
    fn periodic(
        &mut self,
        now: Instant,
    ) {
        self.now = now;
        let pilot = self.input.pilot;
        self.climb.set_demand(pilot.left_trigger - pilot.right_trigger);
        for subsystem in self.subsystems() {
            subsystem.periodic(now);
        }

        let measurement = self.vision.latest_measurement();
        self.drive.add_vision_measurement(measurement);
    }
}

/// Implement [`Owns`] for each subsystem field of [`Robot`].
macro_rules! owns {
    ($($field:ident: $t:ty),* $(,)?) => {
        $(
            impl<P> Owns<$t> for Robot<P> {
                fn subsystem(&self) -> &$t {
                    &self.$field
                }

                fn subsystem_mut(&mut self) -> &mut $t {
                    &mut self.$field
                }
            }
        )*
    };
}

owns! {
    drive: DriveTrain<MODULE_COUNT>,
    vision: Vision,
    intake: Intake,
    wheels: Wheels,
    elevator: Elevator,
    gripper: Gripper<P>,
    arm: PivotArm<P>,
    climb: BuddyClimb,
    indicator: Indicator<P>,
}
