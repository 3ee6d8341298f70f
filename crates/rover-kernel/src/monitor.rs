//! [`LoopMonitor`] – control loop health tracking.
//!
//! Each loop calls [`LoopMonitor::heartbeat`] at the top of every iteration.
//! The monitor keeps the time of the latest heartbeat and the number of
//! iterations started, so a supervisor can tell a busy loop from one that is
//! stuck inside a strategy call.
//!
//! Every loop owns its own pair of atomics, so heartbeats never contend with
//! the other loop or with a reader. The monitor is purely diagnostic and
//! never interrupts a loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rover_types::LoopKind;
use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health reported for a single loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopHealth {
    /// The loop started an iteration within the threshold.
    Healthy,
    /// The loop has not started an iteration within the threshold.
    Stalled,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

/// Heartbeat stamp of a loop that was never registered.
const UNREGISTERED: u64 = u64::MAX;

struct LoopEntry {
    /// Nanoseconds between the monitor's epoch and the latest heartbeat.
    last_heartbeat_ns: AtomicU64,
    iterations: AtomicU64,
}

impl LoopEntry {
    const fn new() -> Self {
        Self {
            last_heartbeat_ns: AtomicU64::new(UNREGISTERED),
            iterations: AtomicU64::new(0),
        }
    }

    fn is_registered(&self) -> bool {
        self.last_heartbeat_ns.load(Ordering::Acquire) != UNREGISTERED
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LoopMonitor
// ────────────────────────────────────────────────────────────────────────────

/// Tracks heartbeats from the control loops.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rover_kernel::monitor::{LoopHealth, LoopMonitor};
/// use rover_types::LoopKind;
///
/// let monitor = LoopMonitor::new();
/// monitor.register(LoopKind::Reactive);
/// monitor.heartbeat(LoopKind::Reactive);
///
/// assert_eq!(monitor.iterations(LoopKind::Reactive), 1);
/// assert_eq!(
///     monitor.health(LoopKind::Reactive, Duration::from_secs(1)),
///     LoopHealth::Healthy
/// );
/// ```
pub struct LoopMonitor {
    epoch: Instant,
    loops: [LoopEntry; LoopKind::ALL.len()],
}

impl Default for LoopMonitor {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
            loops: [LoopEntry::new(), LoopEntry::new()],
        }
    }
}

impl LoopMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, kind: LoopKind) -> &LoopEntry {
        &self.loops[kind as usize]
    }

    fn now_ns(&self) -> u64 {
        // Saturates roughly 584 years after the epoch.
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(UNREGISTERED - 1)
    }

    /// Register `kind`, starting its clock now with zero iterations.
    ///
    /// Re-registering resets both the clock and the counter.
    pub fn register(&self, kind: LoopKind) {
        let entry = self.entry(kind);
        entry.iterations.store(0, Ordering::Relaxed);
        entry.last_heartbeat_ns.store(self.now_ns(), Ordering::Release);
    }

    /// Record the start of a new iteration of `kind`.
    ///
    /// No-ops for loops that have not been registered.
    pub fn heartbeat(&self, kind: LoopKind) {
        let entry = self.entry(kind);
        if entry.is_registered() {
            entry.last_heartbeat_ns.store(self.now_ns(), Ordering::Release);
            entry.iterations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of iterations `kind` has started. Zero for unknown loops.
    pub fn iterations(&self, kind: LoopKind) -> u64 {
        self.entry(kind).iterations.load(Ordering::Relaxed)
    }

    /// Time since the last heartbeat of `kind`, if registered.
    pub fn since_heartbeat(&self, kind: LoopKind) -> Option<Duration> {
        let stamp = self.entry(kind).last_heartbeat_ns.load(Ordering::Acquire);
        (stamp != UNREGISTERED).then(|| Duration::from_nanos(self.now_ns().saturating_sub(stamp)))
    }

    /// Health of `kind` against `threshold`.
    ///
    /// Returns [`LoopHealth::Stalled`] for unknown loops.
    pub fn health(&self, kind: LoopKind, threshold: Duration) -> LoopHealth {
        match self.since_heartbeat(kind) {
            Some(elapsed) if elapsed <= threshold => LoopHealth::Healthy,
            _ => LoopHealth::Stalled,
        }
    }

    /// Every registered loop whose last heartbeat is older than `threshold`,
    /// in [`LoopKind::ALL`] order.
    pub fn stalled(&self, threshold: Duration) -> Vec<LoopKind> {
        let stalled: Vec<LoopKind> = LoopKind::ALL
            .into_iter()
            .filter(|&kind| self.since_heartbeat(kind).is_some_and(|elapsed| elapsed > threshold))
            .collect();
        for kind in &stalled {
            warn!(loop_kind = %kind, threshold_ms = threshold.as_millis() as u64, "control loop stalled");
        }
        stalled
    }
}
