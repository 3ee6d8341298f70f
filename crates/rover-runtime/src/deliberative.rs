//! [`DeliberativeLoop`] – the perceive → plan → act cycle.
//!
//! Each iteration:
//!
//! 1. **Perceive** – run if no cancellation is pending. A fault is reported
//!    and the iteration moves on to planning anyway.
//! 2. **Plan** – run if no cancellation is pending. An empty slot or a fault
//!    both yield an effective [`PlanningResult::NoPlan`].
//! 3. **Act** – run only if no cancellation is pending *and* the effective
//!    plan is [`PlanningResult::Plan`]. A fault is reported, never fatal.
//!
//! The loop repeats with no pacing of its own until the global token is
//! cancelled, then stops the body's motion exactly once.

use std::sync::mpsc::Sender;

use rover_hal::Body;
use rover_types::{LoopKind, LoopState, Phase, PlanningResult};
use tracing::{info, info_span};

use crate::worker::LoopContext;

/// What one deliberative iteration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DeliberativeTick {
    pub planning: PlanningResult,
    pub acted: bool,
    pub faults: u8,
}

/// The deliberative control loop. Constructed and driven by the
/// [`Scheduler`][crate::scheduler::Scheduler].
pub(crate) struct DeliberativeLoop<B: Body + ?Sized> {
    ctx: LoopContext<B>,
}

impl<B: Body + ?Sized> DeliberativeLoop<B> {
    pub(crate) fn new(ctx: LoopContext<B>) -> Self {
        debug_assert_eq!(ctx.kind, LoopKind::Deliberative);
        Self { ctx }
    }

    /// Run until global cancellation, then stop the body and signal `done`.
    pub(crate) fn run(self, done: Sender<LoopKind>) {
        let span = info_span!("deliberative_loop", run_id = %self.ctx.run_id);
        let _enter = span.enter();
        let _exit = self.ctx.exit_guard(done);

        info!("deliberative loop started");
        while !self.ctx.cancel.is_cancelled() {
            self.tick();
        }
        self.ctx.state.advance(LoopState::Stopping);
        info!("deliberative loop observed cancellation");
    }

    /// One perceive → plan → act iteration.
    pub(crate) fn tick(&self) -> DeliberativeTick {
        let ctx = &self.ctx;
        let local = ctx.begin_iteration();
        let mut tick = DeliberativeTick::default();

        if ctx.may_proceed(&local) {
            let perceived = ctx.invoke(Phase::Perceive, &local, ctx.strategies.perceive());
            tick.faults += u8::from(perceived.is_faulted());
        }

        if ctx.may_proceed(&local) {
            let planned = ctx.invoke(Phase::Plan, &local, ctx.strategies.plan());
            tick.faults += u8::from(planned.is_faulted());
            tick.planning = planned.effective();

            if ctx.may_proceed(&local) && tick.planning.is_plan() {
                let acted = ctx.invoke(Phase::Act, &local, ctx.strategies.act());
                tick.faults += u8::from(acted.is_faulted());
                tick.acted = acted.ran();
            }
        }

        tick
    }
}
