//! `rover-kernel` – Loop supervision.
//!
//! The kernel does not run behavior; it watches the loops that do.
//!
//! # Modules
//!
//! - [`monitor`] – [`LoopMonitor`][monitor::LoopMonitor]:
//!   tracks a heartbeat and an iteration counter per control loop and reports
//!   loops whose current iteration has been running longer than a threshold
//!   (a strategy that never returns stalls its own loop).

pub mod monitor;

pub use monitor::{LoopHealth, LoopMonitor};
