//! [`ErrorSink`] – where contained phase faults go.
//!
//! The loops hand every [`PhaseFault`] to the sink and carry on. A sink must
//! never disturb the loop that reports to it; [`report_fault`] additionally
//! swallows a panicking sink.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use rover_types::{Phase, PhaseFault};
use tracing::{error, warn};

use crate::phase::panic_message;

/// Receives faults contained at a phase boundary.
pub trait ErrorSink: Send + Sync {
    fn report(&self, fault: &PhaseFault);
}

impl<F> ErrorSink for F
where
    F: Fn(&PhaseFault) + Send + Sync,
{
    fn report(&self, fault: &PhaseFault) {
        self(fault)
    }
}

/// Default sink: one `tracing` error event per fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, fault: &PhaseFault) {
        error!(
            loop_kind = %fault.loop_kind,
            phase = %fault.phase,
            error = %fault.error,
            "phase fault contained"
        );
    }
}

/// Sink that keeps every fault in memory. Handy for tests and for surfacing
/// recent faults in a status display.
#[derive(Debug, Default)]
pub struct RecordingErrorSink {
    faults: Mutex<Vec<PhaseFault>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every fault recorded so far, oldest first.
    pub fn faults(&self) -> Vec<PhaseFault> {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded faults tagged with `phase`.
    pub fn count(&self, phase: Phase) -> usize {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|fault| fault.phase == phase)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, fault: &PhaseFault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fault.clone());
    }
}

/// Hand `fault` to `sink`, containing a panicking sink.
pub(crate) fn report_fault(sink: &dyn ErrorSink, fault: &PhaseFault) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink.report(fault))) {
        warn!(
            loop_kind = %fault.loop_kind,
            phase = %fault.phase,
            sink_panic = %panic_message(payload.as_ref()),
            "error sink panicked while reporting a phase fault"
        );
    }
}
