//! Autonomous routines.
//!
//! Every routine starts by re-anchoring odometry at the alliance's start pose.
//! Alliance-dependent branches are decided when the routine is scheduled, not
//! when it is built.

use alloc::{rc::Rc, vec};

use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use serde::{Deserialize, Serialize};

use super::{
    mode::{set_mode, GamePiece},
    sequences::{self, Drive, RobotCommand},
    Robot,
};
use crate::utils::{
    command::Command,
    config::AutoConfig,
    controllers::{
        arm::PivotArm,
        elevator::{Elevator, ElevatorLevel},
        gripper::Gripper,
        intake::{Intake, IntakePosition},
        wheels::{WheelSpeed, Wheels},
    },
    math::{from_secs, trajectory::TrajectoryError},
};

/// Open-loop speed for the ramp approach when balancing (m/s).
const RAMP_SPEED: f32 = 0.75;
/// Open-loop speed for leaving the community (m/s).
const MOVE_BACK_SPEED: f32 = 1.0;
const SHOOT_SPIN_UP: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRoutine {
    #[default]
    PlaceConeMoveBack,
    PlaceConeBalance,
    PlaceConeMove,
    ShootCube,
    Stop,
    DoNothing,
}

impl AutoRoutine {
    pub const ALL: [AutoRoutine; 6] = [
        AutoRoutine::PlaceConeMoveBack,
        AutoRoutine::PlaceConeBalance,
        AutoRoutine::PlaceConeMove,
        AutoRoutine::ShootCube,
        AutoRoutine::Stop,
        AutoRoutine::DoNothing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AutoRoutine::PlaceConeMoveBack => "place_cone_move_back",
            AutoRoutine::PlaceConeBalance => "place_cone_balance",
            AutoRoutine::PlaceConeMove => "place_cone_move",
            AutoRoutine::ShootCube => "shoot_cube",
            AutoRoutine::Stop => "stop",
            AutoRoutine::DoNothing => "do_nothing",
        }
    }

    pub fn build<P: OutputPin + 'static>(
        self,
        config: &AutoConfig,
    ) -> Result<RobotCommand<P>, TrajectoryError> {
        let command = match self {
            AutoRoutine::PlaceConeMoveBack => place_cone_move_back(config),
            AutoRoutine::PlaceConeBalance => place_cone_balance(config)?,
            AutoRoutine::PlaceConeMove => place_cone_move(config)?,
            AutoRoutine::ShootCube => shoot_cube(),
            AutoRoutine::Stop => Drive::stop_command(),
            AutoRoutine::DoNothing => Command::none(),
        };
        Ok(command.with_name(self.name()))
    }
}

fn is_blue<P>(robot: &Robot<P>) -> bool {
    robot.is_blue()
}

fn reset_to_start<P: OutputPin + 'static>(config: &AutoConfig) -> RobotCommand<P> {
    Command::either(
        Drive::reset_pose_command(config.blue_start),
        Drive::reset_pose_command(config.red_start),
        is_blue::<P>,
    )
}

/// Score the preloaded cone on the top row.
fn place_cone<P: OutputPin + 'static>(config: &AutoConfig) -> RobotCommand<P> {
    Command::sequence(vec![
        reset_to_start(config),
        Gripper::<P>::default_winch(),
        PivotArm::<P>::pivot(true),
        Command::wait(Duration::from_millis(100)),
        sequences::score_cone_third(),
        Command::wait(Duration::from_millis(100)),
        Gripper::<P>::open_command(true),
        Command::wait(Duration::from_millis(250)),
    ])
}

fn balance_path<P: OutputPin + 'static>(config: &AutoConfig) -> Result<RobotCommand<P>, TrajectoryError> {
    let trajectory = Rc::new(config.balance_trajectory()?);
    let path = Drive::follow_path(trajectory, false);
    Ok(path.along_with(Command::sequence(vec![
        sequences::switch_to_cube(),
        set_mode(GamePiece::Cube),
    ])))
}

fn place_cone_move<P: OutputPin + 'static>(config: &AutoConfig) -> Result<RobotCommand<P>, TrajectoryError> {
    Ok(place_cone(config).and_then(balance_path(config)?))
}

fn place_cone_balance<P: OutputPin + 'static>(config: &AutoConfig) -> Result<RobotCommand<P>, TrajectoryError> {
    let on_target = |robot: &Robot<P>| robot.vision.on_target_balance();
    let approach = Command::either(
        Drive::drive_with_speed(-RAMP_SPEED, 0.0, 0.0).until(on_target),
        Drive::drive_with_speed(RAMP_SPEED, 0.0, 0.0).until(on_target),
        is_blue::<P>,
    );
    Ok(place_cone_move(config)?
        .and_then(approach)
        .and_then(Drive::balance_command()))
}

fn place_cone_move_back<P: OutputPin + 'static>(config: &AutoConfig) -> RobotCommand<P> {
    let leg = from_secs(config.move_back_secs);
    Command::sequence(vec![
        place_cone(config),
        Elevator::extend_to(ElevatorLevel::Down),
        Command::either(
            Drive::drive_with_speed(MOVE_BACK_SPEED, 0.0, 0.0).with_timeout(leg),
            Drive::drive_with_speed(-MOVE_BACK_SPEED, 0.0, 0.0).with_timeout(leg),
            is_blue::<P>,
        ),
    ])
}

fn shoot_cube<P: OutputPin + 'static>() -> RobotCommand<P> {
    Command::sequence(vec![
        set_mode(GamePiece::Cube),
        Intake::set_angle(IntakePosition::Launch),
        Command::wait(SHOOT_SPIN_UP),
        Wheels::target_level_command(WheelSpeed::Third),
        Wheels::launch_to(),
    ])
}
