//! Game-piece handling mode shared by every command predicate.

use embedded_hal::digital::OutputPin;
use serde::{Deserialize, Serialize};

use super::Robot;
use crate::utils::{command::Command, controllers::ResourceSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePiece {
    #[default]
    Cube,
    Cone,
}

/// The only way the mode changes: a command that sets it when run.
pub fn set_mode<P: OutputPin + 'static>(mode: GamePiece) -> Command<Robot<P>> {
    Command::run_once("set_mode", ResourceSet::EMPTY, move |robot: &mut Robot<P>| {
        robot.apply_mode(mode)
    })
}

pub fn in_cube_mode<P>(robot: &Robot<P>) -> bool {
    robot.mode() == GamePiece::Cube
}

pub fn in_cone_mode<P>(robot: &Robot<P>) -> bool {
    robot.mode() == GamePiece::Cone
}
