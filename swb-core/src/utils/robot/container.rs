//! Wires the robot together: registers every command once, installs the
//! default commands and binds operator buttons.
//!
//! # Example
//! ```rust,ignore
//! let mut container = RobotContainer::new(hardware, bus, &config)?;
//! container.autonomous_init(now);
//! loop {
//!     container.set_input(read_gamepads());
//!     container.tick(ticker.next().await);
//! }
//! ```

use alloc::{sync::Arc, vec::Vec};

use embassy_time::{Duration, Instant};
use embedded_hal::digital::OutputPin;

use super::{
    autos::AutoRoutine,
    input::{Button, OperatorInput},
    mode::{in_cone_mode, in_cube_mode, GamePiece},
    sequences::{self, Drive, RobotCommand},
    Robot, RobotHardware,
};
use crate::utils::{
    command::{CommandId, ScheduleOutcome, Scheduler},
    config::{ConfigError, RobotConfig},
    connection::TopicBus,
    controllers::{
        elevator::{Elevator, ElevatorLevel},
        gripper::Gripper,
        indicator::{Color, Indicator},
        intake::IntakePosition,
        wheels::{WheelSpeed, Wheels},
        Resource, ResourceSet,
    },
    math::trajectory::Alliance,
};

fn pilot<P>(button: Button) -> impl Fn(&Robot<P>) -> bool {
    move |robot: &Robot<P>| robot.input.pilot.pressed(button)
}

fn copilot<P>(button: Button) -> impl Fn(&Robot<P>) -> bool {
    move |robot: &Robot<P>| robot.input.copilot.pressed(button)
}

/// Joystick axes for the drive default command. Forward and strafe are
/// inverted on blue so the stick always pushes away from the driver station.
fn drive_axes<P>(robot: &Robot<P>) -> (f32, f32, f32) {
    let pad = robot.input.pilot;
    let sign = if robot.is_blue() { -1.0 } else { 1.0 };
    (sign * pad.left_y, sign * pad.left_x, -pad.right_x)
}

pub struct RobotContainer<P> {
    robot: Robot<P>,
    scheduler: Scheduler<Robot<P>>,
    autos: Vec<(AutoRoutine, CommandId)>,
    selected: AutoRoutine,
    running_auto: Option<CommandId>,
    stop: CommandId,
    balance: CommandId,
    owned: ResourceSet,
}

impl<P: OutputPin + 'static> RobotContainer<P> {
    pub fn new(
        hardware: RobotHardware<P>,
        bus: Arc<TopicBus>,
        config: &RobotConfig,
    ) -> Result<Self, ConfigError> {
        let mut robot = Robot::new(hardware, bus, config);
        let climb_hold = robot.climb.release_time();
        let owned = robot.owned_resources();
        let mut scheduler: Scheduler<Robot<P>> = Scheduler::new();
        let stop = scheduler.register(Drive::stop_command());
        let balance = scheduler.register(Drive::balance_command());

        let mut container = Self {
            robot,
            scheduler,
            autos: Vec::with_capacity(AutoRoutine::ALL.len()),
            selected: config.auto.routine,
            running_auto: None,
            stop,
            balance,
            owned,
        };
        for routine in AutoRoutine::ALL {
            let id = container.register(routine.build::<P>(&config.auto)?);
            container.autos.push((routine, id));
        }

        let drive = container.register(Drive::joystick_command(drive_axes::<P>));
        container.scheduler.set_default_command(Resource::Drivetrain, drive);
        let red = container.register(Indicator::<P>::hold(Color::Red));
        container.scheduler.set_default_command(Resource::Indicator, red);

        container.bind_pilot(climb_hold);
        container.bind_copilot();
        tracing::info!(auto = container.selected.name(), alliance = ?config.alliance, "Robot container ready");
        Ok(container)
    }

    fn bind(
        &mut self,
        condition: impl Fn(&Robot<P>) -> bool + 'static,
        command: RobotCommand<P>,
    ) {
        let id = self.register(command);
        self.scheduler.on_true(condition, id);
    }

    fn bind_pilot(
        &mut self,
        climb_hold: Duration,
    ) {
        let purple = || Indicator::<P>::show(Color::Purple);
        self.bind(
            pilot(Button::A),
            sequences::cube_only(sequences::pickup().along_with(purple())),
        );
        self.bind(pilot(Button::B), sequences::cube_only(sequences::retract()));
        self.bind(
            pilot(Button::RightTrigger),
            sequences::cube_only(sequences::launch(WheelSpeed::Second, IntakePosition::Launch)),
        );
        self.bind(
            pilot(Button::LeftTrigger),
            sequences::cube_only(sequences::launch(WheelSpeed::Third, IntakePosition::Launch)),
        );
        self.bind(pilot(Button::X), sequences::vomit());
        self.bind(pilot(Button::Start), sequences::buddy_climb(climb_hold));
    }

    fn bind_copilot(&mut self) {
        let purple = || Indicator::<P>::show(Color::Purple);
        let yellow = || Indicator::<P>::show(Color::Yellow);

        self.bind(copilot(Button::A), Wheels::launch_to().along_with(purple()));
        self.bind(copilot(Button::B), Gripper::<P>::toggle_command());
        self.bind(
            copilot(Button::X),
            sequences::by_mode(
                sequences::set_target_intake(WheelSpeed::Second).along_with(purple()),
                sequences::score_cone_second().along_with(yellow()),
            ),
        );
        self.bind(
            copilot(Button::Y),
            sequences::by_mode(
                sequences::set_target_intake(WheelSpeed::Third).along_with(purple()),
                sequences::score_cone_third().along_with(yellow()),
            ),
        );
        self.bind(
            copilot(Button::LeftTrigger),
            sequences::cone_only(sequences::pick_cone_from_feeder().along_with(yellow())),
        );
        self.bind(copilot(Button::LeftBumper), Elevator::extend_to(ElevatorLevel::Down));
        self.bind(copilot(Button::RightBumper), Gripper::<P>::default_winch());
        self.bind(
            copilot(Button::Start),
            sequences::enter_mode(GamePiece::Cube).unless(in_cube_mode::<P>),
        );
        self.bind(
            copilot(Button::Back),
            sequences::enter_mode(GamePiece::Cone).unless(in_cone_mode::<P>),
        );
    }

    pub fn robot(&self) -> &Robot<P> {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut Robot<P> {
        &mut self.robot
    }

    pub fn scheduler(&self) -> &Scheduler<Robot<P>> {
        &self.scheduler
    }

    /// Latest controller snapshot; read by bindings on the next tick.
    pub fn set_input(
        &mut self,
        input: OperatorInput,
    ) {
        self.robot.input = input;
    }

    pub fn set_alliance(
        &mut self,
        alliance: Alliance,
    ) {
        self.robot.drive.set_alliance(alliance);
    }

    pub fn selected_autonomous(&self) -> AutoRoutine {
        self.selected
    }

    pub fn select_autonomous(
        &mut self,
        routine: AutoRoutine,
    ) {
        tracing::info!(auto = routine.name(), "Autonomous selected");
        self.selected = routine;
    }

    /// The pre-built command for the selected routine.
    pub fn get_autonomous_command(&self) -> Option<CommandId> {
        self.autos
            .iter()
            .find(|(routine, _)| *routine == self.selected)
            .map(|(_, id)| *id)
    }

    pub fn autonomous_init(
        &mut self,
        now: Instant,
    ) -> ScheduleOutcome {
        let Some(id) = self.get_autonomous_command() else {
            return ScheduleOutcome::Unknown;
        };
        tracing::info!(auto = self.selected.name(), "Autonomous start");
        self.running_auto = Some(id);
        self.scheduler.schedule(id, &mut self.robot, now)
    }

    /// Stop the autonomous routine if it is still running.
    pub fn teleop_init(&mut self) {
        if let Some(id) = self.running_auto.take() {
            self.scheduler.cancel(id, &mut self.robot);
        }
    }

    /// Schedule a registered command outside of any binding.
    pub fn schedule(
        &mut self,
        id: CommandId,
        now: Instant,
    ) -> ScheduleOutcome {
        self.scheduler.schedule(id, &mut self.robot, now)
    }

    /// Add a command to the scheduler. Requirements no subsystem actuates are
    /// logged; the command still registers.
    pub fn register(
        &mut self,
        command: RobotCommand<P>,
    ) -> CommandId {
        let requirements = command.requirements();
        if !self.owned.contains_all(requirements) {
            tracing::warn!(name = command.name(), ?requirements, "Command requires an unowned resource");
        }
        self.scheduler.register(command)
    }

    /// Hold the drivetrain still, interrupting whatever drives it, until
    /// another command takes it over.
    pub fn stop(
        &mut self,
        now: Instant,
    ) -> ScheduleOutcome {
        self.scheduler.schedule(self.stop, &mut self.robot, now)
    }

    /// Level the robot on the charge station.
    pub fn balance(
        &mut self,
        now: Instant,
    ) -> ScheduleOutcome {
        self.scheduler.schedule(self.balance, &mut self.robot, now)
    }

    pub fn tick(
        &mut self,
        now: Instant,
    ) {
        self.scheduler.run(&mut self.robot, now);
    }
}
