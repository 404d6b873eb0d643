//! Cross-subsystem choreography. Subsystems never call each other; these
//! compositions are the only place their actions are combined.

use alloc::vec;

use embassy_time::Duration;
use embedded_hal::digital::OutputPin;

use super::{
    mode::{in_cone_mode, in_cube_mode, set_mode, GamePiece},
    Robot, MODULE_COUNT,
};
use crate::utils::{
    command::Command,
    controllers::{
        arm::PivotArm,
        climb::BuddyClimb,
        drive::DriveTrain,
        elevator::{Elevator, ElevatorLevel},
        gripper::Gripper,
        indicator::{Color, Indicator},
        intake::{Intake, IntakePosition},
        wheels::{WheelSpeed, Wheels},
    },
};

pub type RobotCommand<P> = Command<Robot<P>>;
pub(crate) type Drive = DriveTrain<MODULE_COUNT>;

const LAUNCH_SPIN_UP: Duration = Duration::from_millis(500);
const LAUNCH_DWELL: Duration = Duration::from_millis(400);
const VOMIT_DWELL: Duration = Duration::from_millis(600);
const PIVOT_SETTLE: Duration = Duration::from_millis(300);

/// Deploy, spin in until the rollers stall on a cube, then stow.
pub fn pickup<P: OutputPin + 'static>() -> RobotCommand<P> {
    Command::sequence(vec![
        Intake::set_angle(IntakePosition::Deployed),
        Wheels::intake_until_piece(),
        Intake::set_angle(IntakePosition::Retracted),
    ])
    .with_name("pickup")
}

/// Stow the intake and keep a light grip on whatever is inside.
pub fn retract<P: OutputPin + 'static>() -> RobotCommand<P> {
    Intake::set_angle(IntakePosition::Retracted)
        .along_with(Wheels::set_speed_command(WheelSpeed::Hold))
        .with_name("retract")
}

/// Aim the intake, spin up to `level`, release, then stop the rollers.
pub fn launch<P: OutputPin + 'static>(
    level: WheelSpeed,
    position: IntakePosition,
) -> RobotCommand<P> {
    Command::sequence(vec![
        Intake::set_angle(position),
        Wheels::target_level_command(level),
        Command::wait(LAUNCH_SPIN_UP),
        Wheels::launch_to(),
        Command::wait(LAUNCH_DWELL),
        Wheels::set_speed_command(WheelSpeed::Off),
    ])
    .with_name("launch")
}

/// Spit out whatever is in the rollers.
pub fn vomit<P: OutputPin + 'static>() -> RobotCommand<P> {
    Command::sequence(vec![
        Wheels::set_speed_command(WheelSpeed::First),
        Command::wait(VOMIT_DWELL),
        Wheels::set_speed_command(WheelSpeed::Off),
    ])
    .with_name("vomit")
}

/// Park the cone mechanisms so the intake is free to work.
pub fn switch_to_cube<P: OutputPin + 'static>() -> RobotCommand<P> {
    Command::parallel(vec![
        Elevator::extend_to(ElevatorLevel::Down),
        PivotArm::<P>::pivot(false),
        Intake::set_angle(IntakePosition::Retracted),
        Wheels::set_speed_command(WheelSpeed::Hold),
    ])
    .with_name("switch_to_cube")
}

/// Stow the intake and close the claw for cone handling.
pub fn switch_to_cone<P: OutputPin + 'static>() -> RobotCommand<P> {
    Command::parallel(vec![
        Elevator::extend_to(ElevatorLevel::Down),
        Intake::set_angle(IntakePosition::Retracted),
        Wheels::set_speed_command(WheelSpeed::Off),
        Gripper::<P>::open_command(false),
        PivotArm::<P>::pivot(false),
    ])
    .with_name("switch_to_cone")
}

fn score_cone<P: OutputPin + 'static>(level: ElevatorLevel) -> RobotCommand<P> {
    Command::sequence(vec![
        Elevator::extend_to(level),
        PivotArm::<P>::pivot(true),
        Command::wait(PIVOT_SETTLE),
    ])
}

pub fn score_cone_second<P: OutputPin + 'static>() -> RobotCommand<P> {
    score_cone(ElevatorLevel::Second).with_name("score_cone_second")
}

pub fn score_cone_third<P: OutputPin + 'static>() -> RobotCommand<P> {
    score_cone(ElevatorLevel::Third).with_name("score_cone_third")
}

pub fn pick_cone_from_feeder<P: OutputPin + 'static>() -> RobotCommand<P> {
    Command::sequence(vec![
        Gripper::<P>::open_command(true),
        Elevator::extend_to(ElevatorLevel::Feeder),
        PivotArm::<P>::pivot(true),
    ])
    .with_name("pick_cone_from_feeder")
}

/// Angle the intake for a shot and preselect the launch level.
pub fn set_target_intake<P: OutputPin + 'static>(level: WheelSpeed) -> RobotCommand<P> {
    Intake::set_angle(IntakePosition::Launch)
        .along_with(Wheels::target_level_command(level))
        .with_name("set_target_intake")
}

/// Full transition into `mode`: park the mechanisms, flip the mode, show its colour.
pub fn enter_mode<P: OutputPin + 'static>(mode: GamePiece) -> RobotCommand<P> {
    let (park, color) = match mode {
        GamePiece::Cube => (switch_to_cube(), Color::Purple),
        GamePiece::Cone => (switch_to_cone(), Color::Yellow),
    };
    Command::sequence(vec![park, set_mode(mode), Indicator::<P>::show(color)]).with_name("enter_mode")
}

/// Skip unless the robot is in cube mode.
pub fn cube_only<P: OutputPin + 'static>(command: RobotCommand<P>) -> RobotCommand<P> {
    command.unless(in_cone_mode::<P>)
}

pub fn cone_only<P: OutputPin + 'static>(command: RobotCommand<P>) -> RobotCommand<P> {
    command.unless(in_cube_mode::<P>)
}

/// Pick between a cube and a cone variant when scheduled.
pub fn by_mode<P: OutputPin + 'static>(
    cube: RobotCommand<P>,
    cone: RobotCommand<P>,
) -> RobotCommand<P> {
    Command::either(cube, cone, in_cube_mode::<P>)
}

pub fn buddy_climb<P: OutputPin + 'static>(hold: Duration) -> RobotCommand<P> {
    BuddyClimb::activate(hold)
}
