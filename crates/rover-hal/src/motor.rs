//! Generic `Motor` trait for the rover's speed-controlled drive motors.
//!
//! Drivers implement this trait and are owned by a [`Body`][crate::body::Body]
//! implementation, which decides how to serialise access to them.

use rover_types::RoverError;

/// Upper bound on the magnitude of a commanded speed.
pub const MAX_SPEED: f32 = 1.0;

/// A speed-controlled drive motor.
pub trait Motor: Send + Sync {
    /// Stable identifier, e.g. `"left_motor"`.
    fn id(&self) -> &str;

    /// Command a normalised speed in `[-MAX_SPEED, MAX_SPEED]`. Out-of-range
    /// values are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the command cannot be applied.
    fn set_speed(&mut self, speed: f32) -> Result<(), RoverError>;

    /// The most recently applied speed.
    fn speed(&self) -> f32;

    /// Bring the motor to rest.
    fn stop(&mut self) -> Result<(), RoverError> {
        self.set_speed(0.0)
    }
}

/// Clamp `speed` into the motor range. NaN is treated as a stop.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        0.0
    } else {
        speed.clamp(-MAX_SPEED, MAX_SPEED)
    }
}
