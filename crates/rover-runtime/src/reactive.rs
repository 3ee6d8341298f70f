//! [`ReactiveLoop`] – the fast safety cycle.
//!
//! Runs the `React` strategy over and over, independently of the
//! deliberative loop, so obstacle avoidance is never held up by slow
//! planning. Faults are reported and the loop carries on.
//!
//! By default there is no pacing at all: the loop's cadence is the cost of
//! `React` itself, which makes it a busy loop when the slot is empty or cheap.
//! That keeps reaction latency minimal at the price of a core. A pacing
//! interval can be opted into through
//! [`SchedulerConfig::reactive_pacing`][crate::scheduler::SchedulerConfig::reactive_pacing].

use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use rover_hal::Body;
use rover_types::{LoopKind, LoopState, Phase};
use tracing::{info, info_span};

use crate::phase::PhaseOutcome;
use crate::worker::LoopContext;

/// The reactive control loop. Constructed and driven by the
/// [`Scheduler`][crate::scheduler::Scheduler].
pub(crate) struct ReactiveLoop<B: Body + ?Sized> {
    ctx: LoopContext<B>,
    pacing: Option<Duration>,
}

impl<B: Body + ?Sized> ReactiveLoop<B> {
    pub(crate) fn new(ctx: LoopContext<B>, pacing: Option<Duration>) -> Self {
        debug_assert_eq!(ctx.kind, LoopKind::Reactive);
        Self { ctx, pacing }
    }

    /// Run until global cancellation, then stop the body and signal `done`.
    pub(crate) fn run(self, done: Sender<LoopKind>) {
        let span = info_span!("reactive_loop", run_id = %self.ctx.run_id);
        let _enter = span.enter();
        let _exit = self.ctx.exit_guard(done);

        info!(pacing_ms = self.pacing.map(|p| p.as_millis() as u64), "reactive loop started");
        while !self.ctx.cancel.is_cancelled() {
            self.tick();
            if let Some(pacing) = self.pacing
                && !self.ctx.cancel.is_cancelled()
            {
                thread::sleep(pacing);
            }
        }
        self.ctx.state.advance(LoopState::Stopping);
        info!("reactive loop observed cancellation");
    }

    /// One react iteration.
    pub(crate) fn tick(&self) -> PhaseOutcome<()> {
        let ctx = &self.ctx;
        let local = ctx.begin_iteration();
        if !ctx.may_proceed(&local) {
            return PhaseOutcome::Absent;
        }
        ctx.invoke(Phase::React, &local, ctx.strategies.react())
    }
}
