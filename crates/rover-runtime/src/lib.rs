//! `rover-runtime` – The Rover Brain (Behavior Loop Scheduler)
//!
//! Runs the rover's caller-supplied behavior against a [`Body`][rover_hal::Body]
//! on two concurrent loops and guarantees the body is left stopped.
//!
//! # Modules
//!
//! - [`strategy`] – [`StrategySet`][strategy::StrategySet]: four late-bound
//!   behavior slots (`Perceive`, `Plan`, `Act`, `React`) that can be swapped
//!   while the loops are running.
//! - [`phase`] – [`PhaseOutcome`][phase::PhaseOutcome]: the result of one
//!   phase invocation. Strategy errors and panics both become
//!   [`PhaseOutcome::Faulted`][phase::PhaseOutcome::Faulted].
//! - [`sink`] – [`ErrorSink`][sink::ErrorSink]: where contained phase faults
//!   are reported. [`TracingErrorSink`][sink::TracingErrorSink] is the default.
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]: starts both loops
//!   on their own threads and owns the shutdown protocol. The deliberative
//!   loop runs perceive → plan → act, with `Act` gated on an affirmative
//!   plan; the reactive loop runs react only, as fast as the strategy allows.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter. [`install_panic_hook`][telemetry::install_panic_hook] keeps
//!   contained strategy panics off stderr.
//!
//! The loop drivers themselves are internal; the scheduler is the only way
//! to run them:
//!
//! ```compile_fail
//! use rover_runtime::deliberative::DeliberativeLoop;
//! ```
//!
//! ```compile_fail
//! use rover_runtime::reactive::ReactiveLoop;
//! ```
//!
//! # Cancellation
//!
//! A single global [`CancellationToken`][tokio_util::sync::CancellationToken]
//! stops both loops. Every loop iteration also derives a fresh child token and
//! hands it to the strategies. Nothing cancels the child tokens on their own
//! yet; they are checked between phases so that finer-grained preemption can
//! be wired in later without changing the strategy signature.

mod deliberative;
pub mod phase;
mod reactive;
pub mod scheduler;
pub mod sink;
pub mod strategy;
pub mod telemetry;
mod worker;

pub use phase::PhaseOutcome;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, ShutdownReport};
pub use sink::{ErrorSink, RecordingErrorSink, TracingErrorSink};
pub use strategy::{StrategyFn, StrategySet};
pub use telemetry::{TracerProviderGuard, init_tracing, install_panic_hook};

// Re-exported so strategy authors only need this crate.
pub use rover_types::{LoopKind, LoopState, Phase, PhaseFault, PlanningResult, RoverError};
pub use tokio_util::sync::CancellationToken;
