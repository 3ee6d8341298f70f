//! [`StrategySet`] – the rover's pluggable behavior.
//!
//! Four independent slots, each optionally holding a strategy function:
//!
//! | Slot | Returns | Run by |
//! |---|---|---|
//! | `Perceive` | `()` | deliberative loop |
//! | `Plan` | [`PlanningResult`] | deliberative loop |
//! | `Act` | `()` | deliberative loop, only after `Plan` |
//! | `React` | `()` | reactive loop |
//!
//! Slots are late-bound: the loops read the current slot value every time
//! they are about to invoke it, so a strategy swapped in through the shared
//! `Arc<StrategySet<_>>` takes effect on the next invocation. An empty slot
//! is a no-op for its phase.
//!
//! # Example
//!
//! ```rust
//! use rover_runtime::{PlanningResult, StrategySet};
//! use rover_hal::SimRover;
//!
//! let brain = StrategySet::<SimRover>::new()
//!     .with_plan(|rover, _now, _cancel| {
//!         Ok(if rover.distance_cm() > 30.0 {
//!             PlanningResult::Plan
//!         } else {
//!             PlanningResult::NoPlan
//!         })
//!     })
//!     .with_act(|rover, _now, _cancel| rover.drive(0.4, 0.0));
//!
//! assert!(brain.has_plan());
//! assert!(!brain.has_react());
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rover_types::{PlanningResult, RoverError};
use tokio_util::sync::CancellationToken;

/// A strategy function bound to one phase: `(body, now, cancel) -> Result<T>`.
pub type StrategyFn<B, T> =
    dyn Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<T, RoverError> + Send + Sync;

type Slot<B, T> = RwLock<Option<Arc<StrategyFn<B, T>>>>;

fn read<B: ?Sized, T>(slot: &Slot<B, T>) -> Option<Arc<StrategyFn<B, T>>> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<B: ?Sized, T>(slot: &Slot<B, T>, value: Option<Arc<StrategyFn<B, T>>>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Bundle of the four optional behavior slots for a body of type `B`.
pub struct StrategySet<B: ?Sized> {
    perceive: Slot<B, ()>,
    plan: Slot<B, PlanningResult>,
    act: Slot<B, ()>,
    react: Slot<B, ()>,
}

impl<B: ?Sized> StrategySet<B> {
    /// A set with every slot empty.
    pub fn new() -> Self {
        Self {
            perceive: RwLock::new(None),
            plan: RwLock::new(None),
            act: RwLock::new(None),
            react: RwLock::new(None),
        }
    }

    // -------------------------------------------------------------------------
    // Builder-style construction
    // -------------------------------------------------------------------------

    pub fn with_perceive<F>(self, f: F) -> Self
    where
        F: Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<(), RoverError> + Send + Sync + 'static,
    {
        self.set_perceive(f);
        self
    }

    pub fn with_plan<F>(self, f: F) -> Self
    where
        F: Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<PlanningResult, RoverError>
            + Send
            + Sync
            + 'static,
    {
        self.set_plan(f);
        self
    }

    pub fn with_act<F>(self, f: F) -> Self
    where
        F: Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<(), RoverError> + Send + Sync + 'static,
    {
        self.set_act(f);
        self
    }

    pub fn with_react<F>(self, f: F) -> Self
    where
        F: Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<(), RoverError> + Send + Sync + 'static,
    {
        self.set_react(f);
        self
    }

    // -------------------------------------------------------------------------
    // Hot swapping
    // -------------------------------------------------------------------------

    /// Replace the `Perceive` strategy. Takes effect on its next invocation.
    pub fn set_perceive<F>(&self, f: F)
    where
        F: Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<(), RoverError> + Send + Sync + 'static,
    {
        write(&self.perceive, Some(Arc::new(f)));
    }

    /// Replace the `Plan` strategy. Takes effect on its next invocation.
    pub fn set_plan<F>(&self, f: F)
    where
        F: Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<PlanningResult, RoverError>
            + Send
            + Sync
            + 'static,
    {
        write(&self.plan, Some(Arc::new(f)));
    }

    /// Replace the `Act` strategy. Takes effect on its next invocation.
    pub fn set_act<F>(&self, f: F)
    where
        F: Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<(), RoverError> + Send + Sync + 'static,
    {
        write(&self.act, Some(Arc::new(f)));
    }

    /// Replace the `React` strategy. Takes effect on its next invocation.
    pub fn set_react<F>(&self, f: F)
    where
        F: Fn(&B, DateTime<Utc>, &CancellationToken) -> Result<(), RoverError> + Send + Sync + 'static,
    {
        write(&self.react, Some(Arc::new(f)));
    }

    pub fn clear_perceive(&self) {
        write(&self.perceive, None);
    }

    /// Empty the `Plan` slot; the effective planning result becomes `NoPlan`.
    pub fn clear_plan(&self) {
        write(&self.plan, None);
    }

    pub fn clear_act(&self) {
        write(&self.act, None);
    }

    pub fn clear_react(&self) {
        write(&self.react, None);
    }

    // -------------------------------------------------------------------------
    // Late-bound reads
    // -------------------------------------------------------------------------

    /// Snapshot of the current `Perceive` slot.
    pub fn perceive(&self) -> Option<Arc<StrategyFn<B, ()>>> {
        read(&self.perceive)
    }

    /// Snapshot of the current `Plan` slot.
    pub fn plan(&self) -> Option<Arc<StrategyFn<B, PlanningResult>>> {
        read(&self.plan)
    }

    /// Snapshot of the current `Act` slot.
    pub fn act(&self) -> Option<Arc<StrategyFn<B, ()>>> {
        read(&self.act)
    }

    /// Snapshot of the current `React` slot.
    pub fn react(&self) -> Option<Arc<StrategyFn<B, ()>>> {
        read(&self.react)
    }

    pub fn has_perceive(&self) -> bool {
        self.perceive().is_some()
    }

    pub fn has_plan(&self) -> bool {
        self.plan().is_some()
    }

    pub fn has_act(&self) -> bool {
        self.act().is_some()
    }

    pub fn has_react(&self) -> bool {
        self.react().is_some()
    }
}

impl<B: ?Sized> Default for StrategySet<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ?Sized> fmt::Debug for StrategySet<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = |present: bool| if present { "<set>" } else { "<empty>" };
        f.debug_struct("StrategySet")
            .field("perceive", &slot(self.has_perceive()))
            .field("plan", &slot(self.has_plan()))
            .field("act", &slot(self.has_act()))
            .field("react", &slot(self.has_react()))
            .finish()
    }
}
