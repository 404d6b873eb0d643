//! Driver-facing status light, selected by a 3-bit code on three pins.

use embedded_hal::digital::OutputPin;
use serde::{Deserialize, Serialize};

use super::{hardware::write_pin, Owns, Resource, ResourceSet, Subsystem};
use crate::utils::command::Command;

const INDICATOR: ResourceSet = ResourceSet::of(Resource::Indicator);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Team,
    Red,
    Yellow,
    Blue,
    Animated,
    Green,
    Purple,
}

impl Color {
    /// Code written to the select pins, most significant bit on pin 1.
    pub const fn code(self) -> u8 {
        match self {
            Color::Team => 0b000,
            Color::Red => 0b001,
            Color::Yellow => 0b010,
            Color::Blue => 0b011,
            Color::Animated => 0b100,
            Color::Green => 0b101,
            Color::Purple => 0b110,
        }
    }
}

pub struct Indicator<P> {
    pins: [P; 3],
    color: Option<Color>,
}

impl<P: OutputPin + 'static> Indicator<P> {
    pub fn new(pins: [P; 3]) -> Self {
        Self { pins, color: None }
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    /// Pins are only written when the colour changes.
    pub fn set_color(
        &mut self,
        color: Color,
    ) {
        if self.color == Some(color) {
            return;
        }
        let code = color.code();
        for (i, pin) in self.pins.iter_mut().enumerate() {
            write_pin(pin, (code >> (2 - i)) & 1 == 1, "indicator");
        }
        self.color = Some(color);
    }

    pub fn show<C: Owns<Self> + 'static>(color: Color) -> Command<C> {
        Command::run_once("indicator_show", INDICATOR, move |c: &mut C| {
            c.subsystem_mut().set_color(color)
        })
    }

    /// Keep showing `color` until interrupted.
    pub fn hold<C: Owns<Self> + 'static>(color: Color) -> Command<C> {
        Command::run("indicator_hold", INDICATOR, move |c: &mut C| {
            c.subsystem_mut().set_color(color)
        })
    }
}

impl<P: OutputPin + 'static> Subsystem for Indicator<P> {
    fn resource(&self) -> Option<Resource> {
        Some(Resource::Indicator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};

    #[test]
    fn writes_code_once_per_change() {
        let mut p1 = PinMock::new(&[Transaction::set(State::Low), Transaction::set(State::High)]);
        let mut p2 = PinMock::new(&[Transaction::set(State::Low), Transaction::set(State::High)]);
        let mut p3 = PinMock::new(&[Transaction::set(State::High), Transaction::set(State::Low)]);
        let mut indicator = Indicator::new([p1.clone(), p2.clone(), p3.clone()]);

        indicator.set_color(Color::Red);
        indicator.set_color(Color::Red);
        indicator.set_color(Color::Purple);
        assert_eq!(indicator.color(), Some(Color::Purple));

        p1.done();
        p2.done();
        p3.done();
    }
}
