//! Snapshot of the operator controllers, refreshed by the host every tick.

use serde::{Deserialize, Serialize};

/// Trigger travel past which it counts as a button press.
const TRIGGER_PRESS: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    LeftTrigger,
    RightTrigger,
    Start,
    Back,
}

/// One gamepad. Axes are in `[-1, 1]`, triggers in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerState {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub left_bumper: bool,
    pub right_bumper: bool,
    pub start: bool,
    pub back: bool,
}

impl ControllerState {
    pub fn pressed(
        &self,
        button: Button,
    ) -> bool {
        match button {
            Button::A => self.a,
            Button::B => self.b,
            Button::X => self.x,
            Button::Y => self.y,
            Button::LeftBumper => self.left_bumper,
            Button::RightBumper => self.right_bumper,
            Button::LeftTrigger => self.left_trigger > TRIGGER_PRESS,
            Button::RightTrigger => self.right_trigger > TRIGGER_PRESS,
            Button::Start => self.start,
            Button::Back => self.back,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorInput {
    pub pilot: ControllerState,
    pub copilot: ControllerState,
}
