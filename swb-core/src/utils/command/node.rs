//! The command tree and its per-tick step function.
//!
//! A node is started once, stepped once per tick until it reports done, then
//! ended exactly once: with `interrupted = false` after finishing on its own,
//! or `true` when cancelled. Composite nodes apply the same contract to their
//! children.

use alloc::{boxed::Box, vec::Vec};

use embassy_time::{Duration, Instant};

use crate::utils::math::elapsed;

pub type Action<C> = Box<dyn FnMut(&mut C)>;
pub type EndAction<C> = Box<dyn FnMut(&mut C, bool)>;
pub type Predicate<C> = Box<dyn Fn(&C) -> bool>;

/// When an atomic node reports completion.
pub enum Finish<C> {
    Immediately,
    Never,
    When(Predicate<C>),
}

/// Completion rule for a parallel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelPolicy {
    /// Done once every child is done.
    All,
    /// Done as soon as one child is done; the rest are cancelled.
    Any,
}

pub enum Node<C> {
    NoOp,
    Atomic {
        init: Option<Action<C>>,
        execute: Option<Action<C>>,
        end: Option<EndAction<C>>,
        finish: Finish<C>,
    },
    Sequence {
        children: Vec<Node<C>>,
        index: usize,
    },
    Parallel {
        children: Vec<(Node<C>, bool)>,
        policy: ParallelPolicy,
    },
    /// Picks a branch when started.
    Conditional {
        predicate: Predicate<C>,
        on_true: Box<Node<C>>,
        on_false: Box<Node<C>>,
        selected: bool,
    },
    /// Runs `child` (if any) until it finishes, the predicate holds or the
    /// timeout elapses. A child still running at that point is cancelled.
    Until {
        child: Option<Box<Node<C>>>,
        predicate: Option<Predicate<C>>,
        timeout: Option<Duration>,
        started: Instant,
        child_active: bool,
    },
    /// Skips `child` entirely when the predicate holds at start.
    Guard {
        predicate: Predicate<C>,
        child: Box<Node<C>>,
        skipped: bool,
    },
}

impl<C> Node<C> {
    pub fn start(
        &mut self,
        ctx: &mut C,
        now: Instant,
    ) {
        match self {
            Node::NoOp => {}
            Node::Atomic { init, .. } => {
                if let Some(init) = init {
                    init(ctx);
                }
            }
            Node::Sequence { children, index } => {
                *index = 0;
                if let Some(first) = children.first_mut() {
                    first.start(ctx, now);
                }
            }
            Node::Parallel { children, .. } => {
                for (child, active) in children.iter_mut() {
                    child.start(ctx, now);
                    *active = true;
                }
            }
            Node::Conditional {
                predicate,
                on_true,
                on_false,
                selected,
            } => {
                *selected = predicate(ctx);
                if *selected {
                    on_true.start(ctx, now);
                } else {
                    on_false.start(ctx, now);
                }
            }
            Node::Until {
                child,
                started,
                child_active,
                ..
            } => {
                *started = now;
                *child_active = false;
                if let Some(child) = child {
                    child.start(ctx, now);
                    *child_active = true;
                }
            }
            Node::Guard {
                predicate,
                child,
                skipped,
            } => {
                *skipped = predicate(ctx);
                if !*skipped {
                    child.start(ctx, now);
                }
            }
        }
    }

    /// Advance one tick. Returns `true` when the node has finished; the caller
    /// must then call [`Node::end`] with `interrupted = false`.
    pub fn step(
        &mut self,
        ctx: &mut C,
        now: Instant,
    ) -> bool {
        match self {
            Node::NoOp => true,
            Node::Atomic {
                execute, finish, ..
            } => {
                if let Some(execute) = execute {
                    execute(ctx);
                }
                match finish {
                    Finish::Immediately => true,
                    Finish::Never => false,
                    Finish::When(predicate) => predicate(ctx),
                }
            }
            Node::Sequence { children, index } => {
                let Some(current) = children.get_mut(*index) else {
                    return true;
                };
                if current.step(ctx, now) {
                    current.end(ctx, false);
                    *index += 1;
                    if let Some(next) = children.get_mut(*index) {
                        next.start(ctx, now);
                    }
                }
                *index >= children.len()
            }
            Node::Parallel { children, policy } => {
                let mut any_done = false;
                for (child, active) in children.iter_mut() {
                    if !*active {
                        any_done = true;
                        continue;
                    }
                    if child.step(ctx, now) {
                        child.end(ctx, false);
                        *active = false;
                        any_done = true;
                    }
                }
                match policy {
                    ParallelPolicy::All => children.iter().all(|(_, active)| !*active),
                    ParallelPolicy::Any => any_done || children.is_empty(),
                }
            }
            Node::Conditional {
                on_true,
                on_false,
                selected,
                ..
            } => {
                if *selected {
                    on_true.step(ctx, now)
                } else {
                    on_false.step(ctx, now)
                }
            }
            Node::Until {
                child,
                predicate,
                timeout,
                started,
                child_active,
            } => {
                if *child_active {
                    if let Some(child) = child {
                        if child.step(ctx, now) {
                            child.end(ctx, false);
                            *child_active = false;
                            return true;
                        }
                    }
                }
                let timed_out = timeout.is_some_and(|t| elapsed(now, *started) >= t);
                let condition = predicate.as_ref().is_some_and(|p| p(ctx));
                timed_out || condition
            }
            Node::Guard { child, skipped, .. } => *skipped || child.step(ctx, now),
        }
    }

    pub fn end(
        &mut self,
        ctx: &mut C,
        interrupted: bool,
    ) {
        match self {
            Node::NoOp => {}
            Node::Atomic { end, .. } => {
                if let Some(end) = end {
                    end(ctx, interrupted);
                }
            }
            Node::Sequence { children, index } => {
                if let Some(current) = children.get_mut(*index) {
                    current.end(ctx, interrupted);
                }
                *index = children.len();
            }
            Node::Parallel { children, .. } => {
                for (child, active) in children.iter_mut() {
                    if *active {
                        child.end(ctx, true);
                        *active = false;
                    }
                }
            }
            Node::Conditional {
                on_true,
                on_false,
                selected,
                ..
            } => {
                if *selected {
                    on_true.end(ctx, interrupted);
                } else {
                    on_false.end(ctx, interrupted);
                }
            }
            Node::Until {
                child,
                child_active,
                ..
            } => {
                if *child_active {
                    if let Some(child) = child {
                        child.end(ctx, true);
                    }
                    *child_active = false;
                }
            }
            Node::Guard { child, skipped, .. } => {
                if !*skipped {
                    child.end(ctx, interrupted);
                }
            }
        }
    }
}
