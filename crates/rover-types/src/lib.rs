use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of the planning phase. Gates whether the acting phase runs.
///
/// `NoPlan` is the fallback whenever the Plan slot is empty or faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanningResult {
    /// The planner produced something worth acting on.
    Plan,
    /// Nothing to act on this tick.
    #[default]
    NoPlan,
}

impl PlanningResult {
    /// The planning gate: `true` only for an affirmative [`PlanningResult::Plan`].
    pub fn is_plan(self) -> bool {
        matches!(self, PlanningResult::Plan)
    }
}

/// One phase of the control cycle, used to tag faults and trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Perceive,
    Plan,
    Act,
    React,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Perceive => write!(f, "Perceive"),
            Phase::Plan => write!(f, "Plan"),
            Phase::Act => write!(f, "Act"),
            Phase::React => write!(f, "React"),
        }
    }
}

/// Identifies one of the two concurrent behavior loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKind {
    /// The perceive → plan → act cycle.
    Deliberative,
    /// The react-only safety cycle.
    Reactive,
}

impl LoopKind {
    /// Both loops, in start order.
    pub const ALL: [LoopKind; 2] = [LoopKind::Deliberative, LoopKind::Reactive];
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopKind::Deliberative => write!(f, "deliberative"),
            LoopKind::Reactive => write!(f, "reactive"),
        }
    }
}

/// Lifecycle of a single loop worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LoopState {
    Running,
    /// Global cancellation observed; the loop is winding down.
    Stopping,
    /// The loop body returned and the body's motion has been stopped.
    Stopped,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LoopState::Running,
            1 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }
}

/// Lock-free [`LoopState`] shared between a loop worker and its observers.
///
/// Transitions are monotonic: [`LoopStateCell::advance`] never moves the
/// state backwards.
#[derive(Debug)]
pub struct LoopStateCell(AtomicU8);

impl LoopStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(LoopState::Running as u8))
    }

    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if it is later in the lifecycle than the current state.
    pub fn advance(&self, next: LoopState) {
        self.0.fetch_max(next as u8, Ordering::AcqRel);
    }
}

impl Default for LoopStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// A fault contained at a phase boundary, as handed to the error sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseFault {
    pub loop_kind: LoopKind,
    pub phase: Phase,
    pub error: RoverError,
    pub at: DateTime<Utc>,
}

/// Global error type spanning strategy faults, hardware faults, and
/// scheduler setup failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Strategy Fault: {0}")]
    Strategy(String),

    #[error("Strategy panicked during {phase}: {details}")]
    StrategyPanic { phase: Phase, details: String },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Failed to spawn {loop_kind} loop worker: {details}")]
    WorkerSpawn { loop_kind: LoopKind, details: String },
}

impl RoverError {
    /// Shorthand for a strategy-originated fault.
    pub fn strategy(details: impl Into<String>) -> Self {
        RoverError::Strategy(details.into())
    }
}
