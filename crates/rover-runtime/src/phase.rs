//! [`PhaseOutcome`] – the result of invoking one strategy slot.
//!
//! Loops never see a strategy error or panic directly: [`invoke_phase`] folds
//! both into [`PhaseOutcome::Faulted`], and the loop driver matches on the
//! outcome.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use rover_types::{Phase, PlanningResult, RoverError};

/// Outcome of a single phase invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome<T> {
    /// The strategy ran and returned a value.
    Completed(T),
    /// The slot was empty; nothing ran.
    Absent,
    /// The strategy returned an error or panicked.
    Faulted(RoverError),
}

impl<T> PhaseOutcome<T> {
    pub fn is_faulted(&self) -> bool {
        matches!(self, PhaseOutcome::Faulted(_))
    }

    /// `true` if a strategy actually ran (whether or not it faulted).
    pub fn ran(&self) -> bool {
        !matches!(self, PhaseOutcome::Absent)
    }

    pub fn fault(&self) -> Option<&RoverError> {
        match self {
            PhaseOutcome::Faulted(error) => Some(error),
            _ => None,
        }
    }
}

impl PhaseOutcome<PlanningResult> {
    /// The planning result the `Act` gate should use.
    ///
    /// An empty slot and a faulted plan both count as
    /// [`PlanningResult::NoPlan`].
    pub fn effective(&self) -> PlanningResult {
        match self {
            PhaseOutcome::Completed(result) => *result,
            PhaseOutcome::Absent | PhaseOutcome::Faulted(_) => PlanningResult::NoPlan,
        }
    }
}

/// Run `call` (if the slot was filled) and contain whatever it does.
///
/// A contained panic still passes through the process panic hook first. The
/// default hook prints it to stderr; see
/// [`install_panic_hook`](crate::telemetry::install_panic_hook) to log it
/// through `tracing` instead.
pub fn invoke_phase<T, F>(phase: Phase, call: Option<F>) -> PhaseOutcome<T>
where
    F: FnOnce() -> Result<T, RoverError>,
{
    let Some(call) = call else {
        return PhaseOutcome::Absent;
    };
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => PhaseOutcome::Completed(value),
        Ok(Err(error)) => PhaseOutcome::Faulted(error),
        Err(payload) => PhaseOutcome::Faulted(RoverError::StrategyPanic {
            phase,
            details: panic_message(payload.as_ref()),
        }),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
