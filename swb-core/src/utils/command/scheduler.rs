//! Cooperative single-threaded command scheduler.
//!
//! Each call to [`Scheduler::run`] is one tick: the context's periodic update,
//! trigger polling, one step of every running command, then default commands
//! for whatever resources are left idle. Resource ownership is the only
//! arbitration: scheduling a command cancels the current owners of its
//! resources, unless one of them refuses interruption, in which case the new
//! command is rejected. Nothing is ever queued.

use alloc::vec::Vec;

use embassy_time::Instant;
use hashbrown::HashMap;

use super::{
    trigger::{Binding, Edge, TriggerAction},
    Command, InterruptBehavior,
};
use crate::utils::controllers::Resource;

/// Work the context does at the top of every tick, before any command runs.
pub trait Periodic {
    fn periodic(
        &mut self,
        now: Instant,
    );
}

/// Handle to a registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled,
    AlreadyScheduled,
    /// A running command that refuses interruption holds a required resource.
    Rejected { holder: CommandId },
    Unknown,
}

pub struct Scheduler<C> {
    commands: Vec<Command<C>>,
    running: Vec<CommandId>,
    owners: HashMap<Resource, CommandId>,
    defaults: Vec<(Resource, CommandId)>,
    bindings: Vec<Binding<C>>,
}

impl<C: 'static> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            running: Vec::new(),
            owners: HashMap::new(),
            defaults: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        command: Command<C>,
    ) -> CommandId {
        self.commands.push(command);
        CommandId(self.commands.len() - 1)
    }

    pub fn name(
        &self,
        id: CommandId,
    ) -> Option<&'static str> {
        self.commands.get(id.0).map(Command::name)
    }

    pub fn is_scheduled(
        &self,
        id: CommandId,
    ) -> bool {
        self.running.contains(&id)
    }

    /// The command currently holding `resource`.
    pub fn requiring(
        &self,
        resource: Resource,
    ) -> Option<CommandId> {
        self.owners.get(&resource).copied()
    }

    pub fn running(&self) -> &[CommandId] {
        &self.running
    }

    /// Run `id` whenever `resource` is otherwise idle. The command must require
    /// `resource`; returns `false` and leaves the default unchanged otherwise.
    pub fn set_default_command(
        &mut self,
        resource: Resource,
        id: CommandId,
    ) -> bool {
        let Some(command) = self.commands.get(id.0) else {
            tracing::warn!(?id, "Unknown default command");
            return false;
        };
        if !command.requirements().contains(resource) {
            tracing::warn!(?resource, name = command.name(), "Default command must require its resource");
            return false;
        }
        self.defaults.retain(|(r, _)| *r != resource);
        self.defaults.push((resource, id));
        true
    }

    pub fn bind(
        &mut self,
        condition: impl Fn(&C) -> bool + 'static,
        action: TriggerAction,
        command: CommandId,
    ) {
        self.bindings.push(Binding::new(condition, action, command));
    }

    pub fn on_true(
        &mut self,
        condition: impl Fn(&C) -> bool + 'static,
        command: CommandId,
    ) {
        self.bind(condition, TriggerAction::OnTrue, command);
    }

    pub fn while_true(
        &mut self,
        condition: impl Fn(&C) -> bool + 'static,
        command: CommandId,
    ) {
        self.bind(condition, TriggerAction::WhileTrue, command);
    }

    /// Start `id` now, cancelling whatever holds its resources.
    pub fn schedule(
        &mut self,
        id: CommandId,
        ctx: &mut C,
        now: Instant,
    ) -> ScheduleOutcome {
        let Some(command) = self.commands.get(id.0) else {
            tracing::warn!(?id, "Unknown command");
            return ScheduleOutcome::Unknown;
        };
        if self.running.contains(&id) {
            return ScheduleOutcome::AlreadyScheduled;
        }
        let requirements = command.requirements();

        let mut holders: Vec<CommandId> = Vec::new();
        for resource in requirements.iter() {
            if let Some(&holder) = self.owners.get(&resource) {
                if self.commands[holder.0].interrupt_behavior() == InterruptBehavior::CancelIncoming {
                    tracing::debug!(
                        name = self.commands[id.0].name(),
                        holder = self.commands[holder.0].name(),
                        "Command rejected"
                    );
                    return ScheduleOutcome::Rejected { holder };
                }
                if !holders.contains(&holder) {
                    holders.push(holder);
                }
            }
        }

        for holder in holders {
            tracing::debug!(
                name = self.commands[holder.0].name(),
                by = self.commands[id.0].name(),
                "Command interrupted"
            );
            self.finish(holder, ctx, true);
        }

        for resource in requirements.iter() {
            self.owners.insert(resource, id);
        }
        self.running.push(id);
        tracing::debug!(name = self.commands[id.0].name(), "Command scheduled");
        self.commands[id.0].node_mut().start(ctx, now);
        ScheduleOutcome::Scheduled
    }

    /// Cancel `id` if it is running, running its end hook with `interrupted = true`.
    pub fn cancel(
        &mut self,
        id: CommandId,
        ctx: &mut C,
    ) -> bool {
        if !self.running.contains(&id) {
            return false;
        }
        tracing::debug!(name = self.commands[id.0].name(), "Command cancelled");
        self.finish(id, ctx, true);
        true
    }

    /// One tick.
    pub fn run(
        &mut self,
        ctx: &mut C,
        now: Instant,
    ) where
        C: Periodic,
    {
        ctx.periodic(now);
        self.poll_bindings(ctx, now);

        let snapshot = self.running.clone();
        for id in snapshot {
            if !self.running.contains(&id) {
                continue;
            }
            if self.commands[id.0].node_mut().step(ctx, now) {
                tracing::debug!(name = self.commands[id.0].name(), "Command finished");
                self.finish(id, ctx, false);
            }
        }

        for i in 0..self.defaults.len() {
            let (resource, id) = self.defaults[i];
            if !self.owners.contains_key(&resource) && !self.running.contains(&id) {
                self.schedule(id, ctx, now);
            }
        }
    }

    fn poll_bindings(
        &mut self,
        ctx: &mut C,
        now: Instant,
    ) {
        let mut fired: Vec<(Edge, TriggerAction, CommandId)> = Vec::new();
        for binding in self.bindings.iter_mut() {
            let edge = binding.poll(ctx);
            if edge != Edge::Steady {
                fired.push((edge, binding.action, binding.command));
            }
        }
        for (edge, action, id) in fired {
            match (action, edge) {
                (TriggerAction::OnTrue, Edge::Rising)
                | (TriggerAction::OnFalse, Edge::Falling)
                | (TriggerAction::WhileTrue, Edge::Rising) => {
                    self.schedule(id, ctx, now);
                }
                (TriggerAction::WhileTrue, Edge::Falling) => {
                    self.cancel(id, ctx);
                }
                (TriggerAction::ToggleOnTrue, Edge::Rising) => {
                    if self.is_scheduled(id) {
                        self.cancel(id, ctx);
                    } else {
                        self.schedule(id, ctx, now);
                    }
                }
                _ => {}
            }
        }
    }

    fn finish(
        &mut self,
        id: CommandId,
        ctx: &mut C,
        interrupted: bool,
    ) {
        self.running.retain(|r| *r != id);
        self.owners.retain(|_, owner| *owner != id);
        self.commands[id.0].node_mut().end(ctx, interrupted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::Finish;
    use crate::utils::controllers::ResourceSet;
    use alloc::{string::String, vec};
    use embassy_time::Duration;

    #[derive(Default)]
    struct Bench {
        log: Vec<String>,
        button: bool,
        ticks: u32,
    }

    impl Periodic for Bench {
        fn periodic(
            &mut self,
            _now: Instant,
        ) {
            self.ticks += 1;
        }
    }

    fn tracked(
        tag: &'static str,
        requirements: ResourceSet,
    ) -> Command<Bench> {
        Command::functional(
            tag,
            requirements,
            move |b: &mut Bench| b.log.push(alloc::format!("{tag}:init")),
            move |b: &mut Bench| b.log.push(alloc::format!("{tag}:step")),
            move |b: &mut Bench, interrupted| {
                b.log.push(alloc::format!("{tag}:{}", if interrupted { "cancel" } else { "end" }))
            },
            Finish::Never,
        )
    }

    fn tick(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    const DRIVE: ResourceSet = ResourceSet::of(Resource::Drivetrain);

    #[test]
    fn newcomer_cancels_holder_before_first_step() {
        let mut bench = Bench::default();
        let mut sched = Scheduler::new();
        let a = sched.register(tracked("a", DRIVE));
        let b = sched.register(tracked("b", DRIVE));

        assert_eq!(sched.schedule(a, &mut bench, tick(0)), ScheduleOutcome::Scheduled);
        sched.run(&mut bench, tick(20));
        assert_eq!(sched.schedule(b, &mut bench, tick(30)), ScheduleOutcome::Scheduled);
        sched.run(&mut bench, tick(40));

        assert_eq!(bench.log, vec!["a:init", "a:step", "a:cancel", "b:init", "b:step"]);
        assert_eq!(bench.log.iter().filter(|l| *l == "a:cancel").count(), 1);
        assert!(!sched.is_scheduled(a));
        assert_eq!(sched.requiring(Resource::Drivetrain), Some(b));
    }

    #[test]
    fn non_interruptible_holder_rejects_newcomer() {
        let mut bench = Bench::default();
        let mut sched = Scheduler::new();
        let a = sched.register(tracked("a", DRIVE).with_interrupt_behavior(InterruptBehavior::CancelIncoming));
        let b = sched.register(tracked("b", DRIVE.with(Resource::Arm)));

        sched.schedule(a, &mut bench, tick(0));
        assert_eq!(sched.schedule(b, &mut bench, tick(0)), ScheduleOutcome::Rejected { holder: a });
        assert!(sched.is_scheduled(a));
        assert_eq!(sched.requiring(Resource::Arm), None);
        assert_eq!(bench.log, vec!["a:init"]);
    }

    #[test]
    fn rescheduling_and_unknown_ids() {
        let mut bench = Bench::default();
        let mut sched = Scheduler::new();
        let a = sched.register(tracked("a", DRIVE));
        sched.schedule(a, &mut bench, tick(0));
        assert_eq!(sched.schedule(a, &mut bench, tick(0)), ScheduleOutcome::AlreadyScheduled);
        assert_eq!(sched.schedule(CommandId(9), &mut bench, tick(0)), ScheduleOutcome::Unknown);
    }

    #[test]
    fn finished_command_releases_resources() {
        let mut bench = Bench::default();
        let mut sched = Scheduler::new();
        let once = sched.register(Command::run_once("once", DRIVE, |b: &mut Bench| b.log.push("once".into())));
        sched.schedule(once, &mut bench, tick(0));
        sched.run(&mut bench, tick(20));
        assert!(!sched.is_scheduled(once));
        assert_eq!(sched.requiring(Resource::Drivetrain), None);
        assert_eq!(bench.ticks, 1);
    }

    #[test]
    fn default_command_fills_idle_resource() {
        let mut bench = Bench::default();
        let mut sched = Scheduler::new();
        let idle = sched.register(tracked("idle", DRIVE));
        let other = sched.register(tracked("other", ResourceSet::of(Resource::Arm)));
        assert!(!sched.set_default_command(Resource::Drivetrain, other));
        assert!(sched.set_default_command(Resource::Drivetrain, idle));

        sched.run(&mut bench, tick(0));
        assert!(sched.is_scheduled(idle));
        sched.run(&mut bench, tick(20));
        assert_eq!(bench.log, vec!["idle:init", "idle:step"]);
    }

    #[test]
    fn bindings_follow_edges() {
        let mut bench = Bench::default();
        let mut sched = Scheduler::new();
        let held = sched.register(tracked("held", DRIVE));
        let toggled = sched.register(tracked("toggled", ResourceSet::of(Resource::Arm)));
        sched.while_true(|b: &Bench| b.button, held);
        sched.bind(|b: &Bench| b.button, TriggerAction::ToggleOnTrue, toggled);

        bench.button = true;
        sched.run(&mut bench, tick(0));
        assert!(sched.is_scheduled(held));
        assert!(sched.is_scheduled(toggled));

        sched.run(&mut bench, tick(20));
        bench.button = false;
        sched.run(&mut bench, tick(40));
        assert!(!sched.is_scheduled(held));
        assert!(sched.is_scheduled(toggled));

        bench.button = true;
        sched.run(&mut bench, tick(60));
        assert!(!sched.is_scheduled(toggled));
    }

    #[test]
    fn timeout_completes_no_earlier_than_limit() {
        let mut bench = Bench::default();
        let mut sched = Scheduler::new();
        let limit = Duration::from_millis(4920);
        let id = sched.register(tracked("drive", DRIVE).until(|_: &Bench| false).with_timeout(limit));
        sched.schedule(id, &mut bench, tick(0));

        let mut finished_at = None;
        for n in 1..=400u64 {
            sched.run(&mut bench, tick(n * 20));
            if !sched.is_scheduled(id) {
                finished_at = Some(n * 20);
                break;
            }
        }
        assert_eq!(finished_at, Some(4920));
        assert_eq!(bench.log.last().map(String::as_str), Some("drive:cancel"));
    }

    #[test]
    fn guard_skips_every_step() {
        let mut bench = Bench::default();
        bench.button = true;
        let mut sched = Scheduler::new();
        let id = sched.register(tracked("guarded", DRIVE).unless(|b: &Bench| b.button));
        sched.schedule(id, &mut bench, tick(0));
        sched.run(&mut bench, tick(20));
        assert!(bench.log.is_empty());
        assert!(!sched.is_scheduled(id));
    }
}
