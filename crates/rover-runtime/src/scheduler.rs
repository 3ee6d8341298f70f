//! [`Scheduler`] – starts the two behavior loops and shuts them down.
//!
//! [`Scheduler::start`] spawns the deliberative and the reactive loop on
//! two named OS threads that share one
//! [`StrategySet`] and one [`Body`]. The returned [`SchedulerHandle`] owns the
//! global cancellation token.
//!
//! # Shutdown protocol
//!
//! [`SchedulerHandle::stop`]:
//!
//! 1. cancels the global token;
//! 2. waits for both loops to finish, for at most
//!    [`SchedulerConfig::shutdown_timeout`];
//! 3. releases the body, whether or not the loops made it in time.
//!
//! A strategy that never returns can therefore delay shutdown by the timeout
//! and no more. Its thread is left to finish on its own; the body has
//! already been stopped and released by then.
//!
//! # Shared body
//!
//! Both loops call into the same body with no locking in between. The
//! [`Body`] implementation is responsible for making its command surface
//! thread-safe.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_hal::SimRover;
//! use rover_runtime::{Scheduler, SchedulerConfig, StrategySet};
//!
//! let brain = Arc::new(StrategySet::<SimRover>::new().with_react(|rover, _now, _cancel| {
//!     if rover.distance_cm() < 20.0 {
//!         rover.drive(0.0, 0.0)?;
//!     }
//!     Ok(())
//! }));
//! let handle = Scheduler::new(SchedulerConfig::default())
//!     .start(brain, Arc::new(SimRover::new()))
//!     .expect("failed to start loops");
//! // ... later
//! let report = handle.stop();
//! assert!(report.body_released);
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rover_hal::Body;
use rover_kernel::LoopMonitor;
use rover_types::{LoopKind, LoopState, LoopStateCell, RoverError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::deliberative::DeliberativeLoop;
use crate::phase::panic_message;
use crate::reactive::ReactiveLoop;
use crate::sink::{ErrorSink, TracingErrorSink};
use crate::strategy::StrategySet;
use crate::telemetry::LOOP_THREAD_PREFIX;
use crate::worker::LoopContext;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// How long shutdown waits for the loops before releasing the body anyway.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A loop that has not started an iteration for this long is reported as
/// stalled by [`SchedulerHandle::stalled_loops`].
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(1);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on the wait for both loops during shutdown.
    pub shutdown_timeout: Duration,
    /// Optional sleep between reactive iterations. `None` (the default) keeps
    /// the reactive loop unthrottled for minimum reaction latency.
    pub reactive_pacing: Option<Duration>,
    /// Diagnostic threshold for [`SchedulerHandle::stalled_loops`].
    pub stall_threshold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            reactive_pacing: None,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Starts behavior loops against a [`StrategySet`] and a [`Body`].
pub struct Scheduler {
    config: SchedulerConfig,
    sink: Arc<dyn ErrorSink>,
}

impl Scheduler {
    /// Scheduler reporting phase faults through [`TracingErrorSink`].
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(TracingErrorSink),
        }
    }

    /// Replace the sink that receives contained phase faults.
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Start both loops on their own threads.
    ///
    /// `strategies` and `body` stay shared with the caller: strategies can be
    /// swapped through the same `Arc` while the loops run.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::WorkerSpawn`] if a loop thread cannot be
    /// spawned. Any loop already started is cancelled before returning, and
    /// stops the body on its way out.
    pub fn start<B>(
        &self,
        strategies: Arc<StrategySet<B>>,
        body: Arc<B>,
    ) -> Result<SchedulerHandle<B>, RoverError>
    where
        B: Body + ?Sized + 'static,
    {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let monitor = Arc::new(LoopMonitor::new());
        let (done_tx, done_rx) = mpsc::channel();

        let context = |kind: LoopKind| {
            monitor.register(kind);
            LoopContext {
                kind,
                run_id,
                strategies: Arc::clone(&strategies),
                body: Arc::clone(&body),
                cancel: cancel.clone(),
                sink: Arc::clone(&self.sink),
                monitor: Arc::clone(&monitor),
                state: Arc::new(LoopStateCell::new()),
            }
        };

        let deliberative_ctx = context(LoopKind::Deliberative);
        let reactive_ctx = context(LoopKind::Reactive);
        let deliberative_state = Arc::clone(&deliberative_ctx.state);
        let reactive_state = Arc::clone(&reactive_ctx.state);

        let mut workers = Vec::with_capacity(2);

        let tx = done_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("{LOOP_THREAD_PREFIX}deliberative"))
            .spawn(move || DeliberativeLoop::new(deliberative_ctx).run(tx));
        workers.push((LoopKind::Deliberative, spawn_result(LoopKind::Deliberative, spawned, &cancel)?));

        let pacing = self.config.reactive_pacing;
        let spawned = thread::Builder::new()
            .name(format!("{LOOP_THREAD_PREFIX}reactive"))
            .spawn(move || ReactiveLoop::new(reactive_ctx, pacing).run(done_tx));
        workers.push((LoopKind::Reactive, spawn_result(LoopKind::Reactive, spawned, &cancel)?));

        info!(
            run_id = %run_id,
            shutdown_timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
            reactive_pacing_ms = self.config.reactive_pacing.map(|p| p.as_millis() as u64),
            "scheduler started"
        );

        Ok(SchedulerHandle {
            run_id,
            cancel,
            body,
            workers,
            done_rx,
            monitor,
            deliberative_state,
            reactive_state,
            shutdown_timeout: self.config.shutdown_timeout,
            stall_threshold: self.config.stall_threshold,
        })
    }

    /// Run the shutdown protocol on `handle`. Same as [`SchedulerHandle::stop`].
    pub fn stop<B: Body + ?Sized>(handle: SchedulerHandle<B>) -> ShutdownReport {
        handle.stop()
    }
}

fn spawn_result(
    kind: LoopKind,
    spawned: std::io::Result<JoinHandle<()>>,
    cancel: &CancellationToken,
) -> Result<JoinHandle<()>, RoverError> {
    spawned.map_err(|e| {
        error!(loop_kind = %kind, error = %e, "failed to spawn loop worker");
        cancel.cancel();
        RoverError::WorkerSpawn {
            loop_kind: kind,
            details: e.to_string(),
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// SchedulerHandle
// ─────────────────────────────────────────────────────────────────────────────

/// A running pair of loops.
///
/// Dropping the handle without calling [`stop`][Self::stop] cancels the
/// loops but does not wait for them or release the body.
pub struct SchedulerHandle<B: Body + ?Sized> {
    run_id: Uuid,
    cancel: CancellationToken,
    body: Arc<B>,
    workers: Vec<(LoopKind, JoinHandle<()>)>,
    done_rx: Receiver<LoopKind>,
    monitor: Arc<LoopMonitor>,
    deliberative_state: Arc<LoopStateCell>,
    reactive_state: Arc<LoopStateCell>,
    shutdown_timeout: Duration,
    stall_threshold: Duration,
}

impl<B: Body + ?Sized> SchedulerHandle<B> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Lifecycle state of one loop.
    pub fn state(&self, kind: LoopKind) -> LoopState {
        match kind {
            LoopKind::Deliberative => self.deliberative_state.get(),
            LoopKind::Reactive => self.reactive_state.get(),
        }
    }

    /// Iterations started by one loop so far.
    pub fn iterations(&self, kind: LoopKind) -> u64 {
        self.monitor.iterations(kind)
    }

    /// Loops that have not started an iteration within the stall threshold,
    /// typically because a strategy call is hanging.
    pub fn stalled_loops(&self) -> Vec<LoopKind> {
        self.monitor.stalled(self.stall_threshold)
    }

    /// `true` once global cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The shared body.
    pub fn body(&self) -> &Arc<B> {
        &self.body
    }

    /// Shut both loops down and release the body.
    ///
    /// Never fails and never blocks longer than the configured shutdown
    /// timeout (plus the time `release` itself takes). A timeout too large to
    /// add to the current instant waits for the loops without a deadline.
    pub fn stop(mut self) -> ShutdownReport {
        let started = Instant::now();
        info!(run_id = %self.run_id, "shutdown requested");

        // 1. Signal.
        self.cancel.cancel();

        // 2. Bounded wait. A timeout past the end of the clock waits without
        // a deadline.
        let deadline = started.checked_add(self.shutdown_timeout);
        let mut finished = Vec::with_capacity(self.workers.len());
        while finished.len() < self.workers.len() {
            let received = match deadline {
                Some(deadline) => self
                    .done_rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => self.done_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(kind) => finished.push(kind),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut timed_out = Vec::new();
        for (kind, worker) in self.workers.drain(..) {
            if finished.contains(&kind) {
                if worker.join().is_err() {
                    warn!(loop_kind = %kind, "loop worker unwound after stopping");
                }
            } else {
                warn!(
                    loop_kind = %kind,
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "loop did not stop within the shutdown timeout; releasing body anyway"
                );
                timed_out.push(kind);
            }
        }

        // 3. Release regardless.
        let body = &self.body;
        let body_released = match panic::catch_unwind(AssertUnwindSafe(|| body.release())) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(run_id = %self.run_id, error = %e, "body release failed");
                false
            }
            Err(payload) => {
                error!(
                    run_id = %self.run_id,
                    panic = %panic_message(payload.as_ref()),
                    "body release panicked"
                );
                false
            }
        };

        finished.sort_by_key(|kind| *kind as u8);
        let report = ShutdownReport {
            run_id: self.run_id,
            finished,
            timed_out,
            elapsed_ms: started.elapsed().as_millis() as u64,
            body_released,
        };
        info!(
            run_id = %report.run_id,
            elapsed_ms = report.elapsed_ms,
            timed_out = report.timed_out.len(),
            "shutdown complete"
        );
        report
    }
}

impl<B: Body + ?Sized> Drop for SchedulerHandle<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ShutdownReport
// ─────────────────────────────────────────────────────────────────────────────

/// What happened during [`SchedulerHandle::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub run_id: Uuid,
    /// Loops that exited within the shutdown timeout.
    pub finished: Vec<LoopKind>,
    /// Loops still running when the timeout elapsed.
    pub timed_out: Vec<LoopKind>,
    pub elapsed_ms: u64,
    /// `false` if the body's `release` returned an error or panicked.
    pub body_released: bool,
}

impl ShutdownReport {
    /// Both loops stopped in time and the body was released.
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty() && self.body_released
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingErrorSink;
    use rover_hal::SimRover;
    use rover_types::{Phase, PlanningResult};

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout: Duration::from_secs(2),
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn default_config_matches_reference_behavior() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(cfg.reactive_pacing, None);
    }

    #[test]
    fn start_then_stop_is_clean() {
        let rover = Arc::new(SimRover::new());
        let handle = Scheduler::new(quick_config())
            .start(Arc::new(StrategySet::new()), Arc::clone(&rover))
            .unwrap();
        assert!(!handle.is_cancelled());

        let report = handle.stop();
        assert!(report.is_clean());
        assert_eq!(report.finished, vec![LoopKind::Deliberative, LoopKind::Reactive]);
        // One stop per loop, plus the one inside release.
        assert_eq!(rover.stop_count(), 3);
        assert_eq!(rover.release_count(), 1);
    }

    #[test]
    fn loops_report_running_then_stopped() {
        let rover = Arc::new(SimRover::new());
        let handle = Scheduler::new(quick_config())
            .start(Arc::new(StrategySet::new()), Arc::clone(&rover))
            .unwrap();
        assert_eq!(handle.state(LoopKind::Deliberative), LoopState::Running);
        assert_eq!(handle.state(LoopKind::Reactive), LoopState::Running);

        let deliberative = Arc::clone(&handle.deliberative_state);
        let reactive = Arc::clone(&handle.reactive_state);
        handle.stop();
        assert_eq!(deliberative.get(), LoopState::Stopped);
        assert_eq!(reactive.get(), LoopState::Stopped);
    }

    #[test]
    fn custom_sink_receives_faults() {
        let sink = Arc::new(RecordingErrorSink::new());
        let brain = Arc::new(
            StrategySet::<SimRover>::new()
                .with_plan(|_, _, _| Err(RoverError::strategy("no map"))),
        );
        let handle = Scheduler::new(quick_config())
            .with_error_sink(sink.clone())
            .start(brain, Arc::new(SimRover::new()))
            .unwrap();
        while sink.count(Phase::Plan) == 0 {
            thread::yield_now();
        }
        handle.stop();
        assert!(sink.faults().iter().all(|f| f.phase == Phase::Plan));
    }

    #[test]
    fn dropping_handle_cancels_loops() {
        let rover = Arc::new(SimRover::new());
        let brain = Arc::new(
            StrategySet::<SimRover>::new()
                .with_plan(|_, _, _| Ok(PlanningResult::Plan))
                .with_act(|rover, _, _| rover.drive(0.2, 0.0)),
        );
        let handle = Scheduler::new(quick_config())
            .start(brain, Arc::clone(&rover))
            .unwrap();
        let state = Arc::clone(&handle.reactive_state);
        drop(handle);

        let deadline = Instant::now() + Duration::from_secs(2);
        while state.get() != LoopState::Stopped && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(state.get(), LoopState::Stopped);
        assert_eq!(rover.release_count(), 0, "drop does not release the body");
    }

    #[test]
    fn unrepresentable_timeout_still_releases_body() {
        let rover = Arc::new(SimRover::new());
        let config = SchedulerConfig {
            shutdown_timeout: Duration::from_secs(u64::MAX),
            ..SchedulerConfig::default()
        };
        let handle = Scheduler::new(config)
            .start(Arc::new(StrategySet::new()), Arc::clone(&rover))
            .unwrap();

        let report = handle.stop();
        assert!(report.body_released);
        assert!(report.is_clean());
        assert_eq!(rover.release_count(), 1);
    }

    #[test]
    fn report_serializes() {
        let report = ShutdownReport {
            run_id: Uuid::new_v4(),
            finished: vec![LoopKind::Deliberative],
            timed_out: vec![LoopKind::Reactive],
            elapsed_ms: 10_000,
            body_released: true,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"timed_out\":[\"reactive\"]"));
        assert!(!report.is_clean());
    }
}
