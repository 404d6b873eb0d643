use alloc::boxed::Box;

use super::{node::Predicate, scheduler::CommandId};

/// What a binding does on the edges of its condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Schedule on the rising edge.
    OnTrue,
    /// Schedule on the falling edge.
    OnFalse,
    /// Schedule on the rising edge, cancel on the falling edge.
    WhileTrue,
    /// Rising edge schedules if idle, cancels if running.
    ToggleOnTrue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    Rising,
    Falling,
    Steady,
}

/// Edge-detected boolean condition bound to a command.
pub(crate) struct Binding<C> {
    condition: Predicate<C>,
    last: bool,
    pub action: TriggerAction,
    pub command: CommandId,
}

impl<C> Binding<C> {
    pub fn new(
        condition: impl Fn(&C) -> bool + 'static,
        action: TriggerAction,
        command: CommandId,
    ) -> Self {
        Self {
            condition: Box::new(condition),
            last: false,
            action,
            command,
        }
    }

    pub fn poll(
        &mut self,
        ctx: &C,
    ) -> Edge {
        let current = (self.condition)(ctx);
        let edge = match (self.last, current) {
            (false, true) => Edge::Rising,
            (true, false) => Edge::Falling,
            _ => Edge::Steady,
        };
        self.last = current;
        edge
    }
}
