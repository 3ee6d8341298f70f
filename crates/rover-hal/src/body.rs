//! The [`Body`] contract shared by every rover implementation.
//!
//! Both control loops hold the same body and may command it concurrently;
//! nothing in the scheduler serialises those calls. A `Body` therefore owns
//! whatever synchronisation its command surface needs (a mutex around the
//! motor drivers, a command queue, ...).

use std::sync::Arc;

use rover_types::RoverError;

/// The actuator/sensor facade handed to every strategy.
pub trait Body: Send + Sync {
    /// Halt every motor.
    ///
    /// Must be idempotent and safe to call concurrently from two threads.
    /// Each control loop calls this exactly once when it exits.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if a driver rejects the command.
    fn stop_all_motion(&self) -> Result<(), RoverError>;

    /// Release the body's hardware at the end of a run.
    ///
    /// Called once by the shutdown protocol after the loops were given their
    /// bounded chance to exit. The default only stops motion.
    fn release(&self) -> Result<(), RoverError> {
        self.stop_all_motion()
    }
}

impl<B: Body + ?Sized> Body for Arc<B> {
    fn stop_all_motion(&self) -> Result<(), RoverError> {
        (**self).stop_all_motion()
    }

    fn release(&self) -> Result<(), RoverError> {
        (**self).release()
    }
}
