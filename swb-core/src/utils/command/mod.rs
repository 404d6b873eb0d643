//! Command composition and scheduling.
//!
//! A [`Command`] is a named [`Node`] tree plus the set of resources it drives.
//! Commands are built once at setup from the constructors and combinators
//! below, registered with the [`Scheduler`] and referred to by [`CommandId`]
//! from then on.
//!
//! # Example
//! ```rust
//! use embassy_time::Duration;
//! use swb_core::utils::command::Command;
//! use swb_core::utils::controllers::{Resource, ResourceSet};
//!
//! struct Ctx { count: u32 }
//!
//! let bump = Command::run_once("bump", ResourceSet::of(Resource::Wheels), |c: &mut Ctx| c.count += 1);
//! let auto = bump
//!     .and_then(Command::wait(Duration::from_millis(100)))
//!     .until(|c: &Ctx| c.count > 10)
//!     .with_name("auto");
//! assert_eq!(auto.name(), "auto");
//! assert!(auto.requirements().contains(Resource::Wheels));
//! ```

pub mod node;
pub mod scheduler;
pub mod trigger;

use alloc::{boxed::Box, vec, vec::Vec};

use embassy_time::{Duration, Instant};

pub use node::{Finish, Node, ParallelPolicy};
pub use scheduler::{CommandId, Periodic, ScheduleOutcome, Scheduler};
pub use trigger::TriggerAction;

use crate::utils::controllers::ResourceSet;

/// What happens when another command wants a resource this one holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptBehavior {
    /// The running command is cancelled and the newcomer starts.
    #[default]
    CancelSelf,
    /// The newcomer is rejected.
    CancelIncoming,
}

pub struct Command<C> {
    name: &'static str,
    node: Node<C>,
    requirements: ResourceSet,
    interrupt: InterruptBehavior,
}

impl<C: 'static> Command<C> {
    pub fn new(
        name: &'static str,
        requirements: ResourceSet,
        node: Node<C>,
    ) -> Self {
        Self {
            name,
            node,
            requirements,
            interrupt: InterruptBehavior::CancelSelf,
        }
    }

    /// Does nothing and finishes on its first step.
    pub fn none() -> Self {
        Self::new("none", ResourceSet::EMPTY, Node::NoOp)
    }

    /// Runs `action` once when started, then finishes.
    pub fn run_once(
        name: &'static str,
        requirements: ResourceSet,
        action: impl FnMut(&mut C) + 'static,
    ) -> Self {
        Self::functional(name, requirements, action, |_| {}, |_, _| {}, Finish::Immediately)
    }

    /// Runs `action` every tick until cancelled.
    pub fn run(
        name: &'static str,
        requirements: ResourceSet,
        action: impl FnMut(&mut C) + 'static,
    ) -> Self {
        Self::functional(name, requirements, |_| {}, action, |_, _| {}, Finish::Never)
    }

    /// Runs `start` once, then `end` when cancelled.
    pub fn start_end(
        name: &'static str,
        requirements: ResourceSet,
        start: impl FnMut(&mut C) + 'static,
        mut end: impl FnMut(&mut C) + 'static,
    ) -> Self {
        Self::functional(name, requirements, start, |_| {}, move |c, _| end(c), Finish::Never)
    }

    pub fn functional(
        name: &'static str,
        requirements: ResourceSet,
        init: impl FnMut(&mut C) + 'static,
        execute: impl FnMut(&mut C) + 'static,
        end: impl FnMut(&mut C, bool) + 'static,
        finish: Finish<C>,
    ) -> Self {
        Self::new(
            name,
            requirements,
            Node::Atomic {
                init: Some(Box::new(init)),
                execute: Some(Box::new(execute)),
                end: Some(Box::new(end)),
                finish,
            },
        )
    }

    /// Finishes once `duration` has elapsed.
    pub fn wait(duration: Duration) -> Self {
        Self::new(
            "wait",
            ResourceSet::EMPTY,
            Node::Until {
                child: None,
                predicate: None,
                timeout: Some(duration),
                started: Instant::from_ticks(0),
                child_active: false,
            },
        )
    }

    /// Finishes on the first tick `predicate` holds.
    pub fn wait_until(predicate: impl Fn(&C) -> bool + 'static) -> Self {
        Self::new(
            "wait_until",
            ResourceSet::EMPTY,
            Node::Until {
                child: None,
                predicate: Some(Box::new(predicate)),
                timeout: None,
                started: Instant::from_ticks(0),
                child_active: false,
            },
        )
    }

    /// Runs `on_true` or `on_false` depending on `predicate` when started.
    pub fn either(
        on_true: Command<C>,
        on_false: Command<C>,
        predicate: impl Fn(&C) -> bool + 'static,
    ) -> Self {
        let requirements = on_true.requirements.union(on_false.requirements);
        Self::new(
            on_true.name,
            requirements,
            Node::Conditional {
                predicate: Box::new(predicate),
                on_true: Box::new(on_true.node),
                on_false: Box::new(on_false.node),
                selected: false,
            },
        )
    }

    pub fn sequence(commands: Vec<Command<C>>) -> Self {
        let requirements = union_of(&commands);
        Self::new(
            "sequence",
            requirements,
            Node::Sequence {
                children: commands.into_iter().map(|c| c.node).collect(),
                index: 0,
            },
        )
    }

    /// Runs every command together; finishes when all have.
    pub fn parallel(commands: Vec<Command<C>>) -> Self {
        Self::group("parallel", commands, ParallelPolicy::All)
    }

    /// Runs every command together; finishes when any has, cancelling the rest.
    pub fn race(commands: Vec<Command<C>>) -> Self {
        Self::group("race", commands, ParallelPolicy::Any)
    }

    fn group(
        name: &'static str,
        commands: Vec<Command<C>>,
        policy: ParallelPolicy,
    ) -> Self {
        let requirements = union_of(&commands);
        Self::new(
            name,
            requirements,
            Node::Parallel {
                children: commands.into_iter().map(|c| (c.node, false)).collect(),
                policy,
            },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn requirements(&self) -> ResourceSet {
        self.requirements
    }

    pub fn interrupt_behavior(&self) -> InterruptBehavior {
        self.interrupt
    }

    pub fn with_name(
        mut self,
        name: &'static str,
    ) -> Self {
        self.name = name;
        self
    }

    /// Declare extra resources without changing behaviour.
    pub fn requiring(
        mut self,
        requirements: ResourceSet,
    ) -> Self {
        self.requirements = self.requirements.union(requirements);
        self
    }

    pub fn with_interrupt_behavior(
        mut self,
        interrupt: InterruptBehavior,
    ) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Run `next` after this command finishes.
    pub fn and_then(
        self,
        next: Command<C>,
    ) -> Self {
        let name = self.name;
        let requirements = self.requirements.union(next.requirements);
        let interrupt = self.interrupt;
        let children = match self.node {
            Node::Sequence {
                mut children,
                ..
            } => {
                children.push(next.node);
                children
            }
            node => vec![node, next.node],
        };
        Self {
            name,
            node: Node::Sequence { children, index: 0 },
            requirements,
            interrupt,
        }
    }

    /// Run `other` alongside; finishes when both have.
    pub fn along_with(
        self,
        other: Command<C>,
    ) -> Self {
        let name = self.name;
        Self::parallel(vec![self, other]).with_name(name)
    }

    /// Run `other` alongside; finishes when either has.
    pub fn race_with(
        self,
        other: Command<C>,
    ) -> Self {
        let name = self.name;
        Self::race(vec![self, other]).with_name(name)
    }

    /// Finish early once `predicate` holds.
    pub fn until(
        self,
        predicate: impl Fn(&C) -> bool + 'static,
    ) -> Self {
        self.bounded(Some(Box::new(predicate)), None)
    }

    /// Finish early once `timeout` has elapsed.
    pub fn with_timeout(
        self,
        timeout: Duration,
    ) -> Self {
        self.bounded(None, Some(timeout))
    }

    fn bounded(
        self,
        predicate: Option<Box<dyn Fn(&C) -> bool>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: self.name,
            node: Node::Until {
                child: Some(Box::new(self.node)),
                predicate,
                timeout,
                started: Instant::from_ticks(0),
                child_active: false,
            },
            requirements: self.requirements,
            interrupt: self.interrupt,
        }
    }

    /// Skip this command entirely if `predicate` holds when it is scheduled.
    pub fn unless(
        self,
        predicate: impl Fn(&C) -> bool + 'static,
    ) -> Self {
        Self {
            name: self.name,
            node: Node::Guard {
                predicate: Box::new(predicate),
                child: Box::new(self.node),
                skipped: false,
            },
            requirements: self.requirements,
            interrupt: self.interrupt,
        }
    }

    pub(crate) fn node_mut(&mut self) -> &mut Node<C> {
        &mut self.node
    }
}

fn union_of<C>(commands: &[Command<C>]) -> ResourceSet {
    commands
        .iter()
        .fold(ResourceSet::EMPTY, |set, c| set.union(c.requirements))
}
