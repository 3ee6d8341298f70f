//! Plumbing shared by both loop workers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::Sender;

use chrono::Utc;
use rover_hal::Body;
use rover_kernel::LoopMonitor;
use rover_types::{LoopKind, LoopState, LoopStateCell, Phase, PhaseFault};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};
use uuid::Uuid;

use crate::phase::{PhaseOutcome, invoke_phase, panic_message};
use crate::sink::{ErrorSink, report_fault};
use crate::strategy::{StrategyFn, StrategySet};

/// Everything a loop worker needs, cloned out of the scheduler per loop.
pub(crate) struct LoopContext<B: Body + ?Sized> {
    pub kind: LoopKind,
    pub run_id: Uuid,
    pub strategies: Arc<StrategySet<B>>,
    pub body: Arc<B>,
    pub cancel: CancellationToken,
    pub sink: Arc<dyn ErrorSink>,
    pub monitor: Arc<LoopMonitor>,
    pub state: Arc<LoopStateCell>,
}

impl<B: Body + ?Sized> LoopContext<B> {
    /// Record the iteration and derive its local cancellation token.
    pub fn begin_iteration(&self) -> CancellationToken {
        self.monitor.heartbeat(self.kind);
        self.cancel.child_token()
    }

    /// Neither the global nor the iteration token is cancelled.
    pub fn may_proceed(&self, local: &CancellationToken) -> bool {
        !self.cancel.is_cancelled() && !local.is_cancelled()
    }

    /// Invoke one strategy slot, reporting any fault to the sink.
    pub fn invoke<T>(
        &self,
        phase: Phase,
        local: &CancellationToken,
        slot: Option<Arc<StrategyFn<B, T>>>,
    ) -> PhaseOutcome<T> {
        trace!(phase = %phase, "enter");
        let body: &B = &self.body;
        let outcome = invoke_phase(phase, slot.map(|f| move || f(body, Utc::now(), local)));
        trace!(phase = %phase, ran = outcome.ran(), "exit");

        if let PhaseOutcome::Faulted(error) = &outcome {
            let fault = PhaseFault {
                loop_kind: self.kind,
                phase,
                error: error.clone(),
                at: Utc::now(),
            };
            report_fault(self.sink.as_ref(), &fault);
        }
        outcome
    }

    /// Exit guard for this loop; see [`ExitGuard`].
    pub fn exit_guard(&self, done: Sender<LoopKind>) -> ExitGuard<B> {
        ExitGuard {
            kind: self.kind,
            body: Arc::clone(&self.body),
            state: Arc::clone(&self.state),
            done: Some(done),
        }
    }
}

/// Runs a loop's exit path when dropped: stop the body's motion once, mark the
/// loop `Stopped`, then tell the shutdown waiter.
///
/// Living in `Drop` means the exit path also runs if the loop body unwinds.
pub(crate) struct ExitGuard<B: Body + ?Sized> {
    kind: LoopKind,
    body: Arc<B>,
    state: Arc<LoopStateCell>,
    done: Option<Sender<LoopKind>>,
}

impl<B: Body + ?Sized> Drop for ExitGuard<B> {
    fn drop(&mut self) {
        self.state.advance(LoopState::Stopping);

        let body = &self.body;
        match panic::catch_unwind(AssertUnwindSafe(|| body.stop_all_motion())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(loop_kind = %self.kind, error = %e, "stop_all_motion failed on loop exit"),
            Err(payload) => error!(
                loop_kind = %self.kind,
                panic = %panic_message(payload.as_ref()),
                "stop_all_motion panicked on loop exit"
            ),
        }

        self.state.advance(LoopState::Stopped);
        info!(loop_kind = %self.kind, "loop stopped");

        if let Some(done) = self.done.take() {
            // The waiter may already have given up; that is fine.
            let _ = done.send(self.kind);
        }
    }
}
