//! `rover-hal` – Hardware Abstraction for the rover body.
//!
//! The scheduler never talks to motors directly; it only needs a [`Body`]
//! it can hand to strategies and stop when a loop exits.
//!
//! # Modules
//!
//! - [`body`] – [`Body`][body::Body]: the actuator/sensor facade contract.
//!   Implementations must make `stop_all_motion` idempotent and safe to call
//!   from both control loops at once.
//! - [`motor`] – [`Motor`][motor::Motor]: speed-controlled drive motors.
//! - [`sim`] – [`SimRover`][sim::SimRover]: an in-process differential-drive
//!   rover for tests and headless runs.

pub mod body;
pub mod motor;
pub mod sim;

pub use body::Body;
pub use motor::Motor;
pub use sim::{SimMotor, SimRover};
