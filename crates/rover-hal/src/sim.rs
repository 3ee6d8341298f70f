//! In-process simulated rover for tests and headless runs.
//!
//! [`SimRover`] is a differential-drive [`Body`] backed by two [`SimMotor`]s
//! and a simulated ultrasonic range sensor. Every motor command goes through a
//! single internal [`Mutex`], so both control loops can drive and stop it at
//! the same time without corrupting state.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::{Body, SimRover};
//!
//! let rover = SimRover::new();
//! rover.drive(0.5, 0.1).expect("sim drive must succeed");
//! rover.stop_all_motion().expect("sim stop must succeed");
//! assert_eq!(rover.wheel_speeds(), (0.0, 0.0));
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rover_types::RoverError;
use tracing::debug;

use crate::body::Body;
use crate::motor::{Motor, clamp_speed};

/// Range reported by a fresh [`SimRover`] when nothing is in front of it.
pub const OPEN_SPACE_CM: f32 = 400.0;

// ────────────────────────────────────────────────────────────────────────────
// Stub motor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated drive motor that records the most recent commanded speed.
/// Always succeeds.
pub struct SimMotor {
    id: String,
    speed: f32,
}

impl SimMotor {
    /// Create a new simulated motor with the given identifier.
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            speed: 0.0,
        })
    }
}

impl Motor for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_speed(&mut self, speed: f32) -> Result<(), RoverError> {
        self.speed = clamp_speed(speed);
        Ok(())
    }

    fn speed(&self) -> f32 {
        self.speed
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRover
// ────────────────────────────────────────────────────────────────────────────

struct DriveTrain {
    left: Box<dyn Motor>,
    right: Box<dyn Motor>,
    distance_cm: f32,
    lights_on: bool,
    blinks: u32,
    released: bool,
}

/// Simulated differential-drive rover.
pub struct SimRover {
    state: Mutex<DriveTrain>,
    stops: AtomicUsize,
    releases: AtomicUsize,
}

impl SimRover {
    /// Rover with `"left_motor"` / `"right_motor"` sim motors and open space
    /// ahead.
    pub fn new() -> Self {
        Self::with_motors(SimMotor::new("left_motor"), SimMotor::new("right_motor"))
    }

    /// Rover built from caller-supplied motor drivers.
    pub fn with_motors(left: Box<dyn Motor>, right: Box<dyn Motor>) -> Self {
        Self {
            state: Mutex::new(DriveTrain {
                left,
                right,
                distance_cm: OPEN_SPACE_CM,
                lights_on: false,
                blinks: 0,
                released: false,
            }),
            stops: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DriveTrain> {
        // Every critical section leaves the drive train consistent, so a
        // poisoned lock is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Command a (linear, angular) velocity pair, mixed onto the two motors
    /// with a unit wheelbase.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] once the rover has been released.
    pub fn drive(&self, linear: f32, angular: f32) -> Result<(), RoverError> {
        let mut train = self.lock();
        if train.released {
            return Err(RoverError::HardwareFault {
                component: "drive_train".to_string(),
                details: "rover has been released".to_string(),
            });
        }
        train.left.set_speed(linear - angular * 0.5)?;
        train.right.set_speed(linear + angular * 0.5)?;
        Ok(())
    }

    /// Current (left, right) motor speeds.
    pub fn wheel_speeds(&self) -> (f32, f32) {
        let train = self.lock();
        (train.left.speed(), train.right.speed())
    }

    /// `true` while either motor is turning.
    pub fn is_moving(&self) -> bool {
        let (left, right) = self.wheel_speeds();
        left != 0.0 || right != 0.0
    }

    /// Latest reading of the simulated ultrasonic sensor, in centimetres.
    pub fn distance_cm(&self) -> f32 {
        self.lock().distance_cm
    }

    /// Place a simulated obstacle `cm` centimetres ahead.
    pub fn set_distance_cm(&self, cm: f32) {
        self.lock().distance_cm = cm.max(0.0);
    }

    /// Switch every LED on.
    pub fn all_lights_on(&self) {
        self.lock().lights_on = true;
    }

    /// Blink every LED once.
    pub fn blink_all_lights(&self) {
        self.lock().blinks += 1;
    }

    pub fn lights_on(&self) -> bool {
        self.lock().lights_on
    }

    pub fn blink_count(&self) -> u32 {
        self.lock().blinks
    }

    /// Number of `stop_all_motion` calls observed so far.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Number of `release` calls observed so far.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }
}

impl Default for SimRover {
    fn default() -> Self {
        Self::new()
    }
}

impl Body for SimRover {
    fn stop_all_motion(&self) -> Result<(), RoverError> {
        let mut train = self.lock();
        train.left.stop()?;
        train.right.stop()?;
        self.stops.fetch_add(1, Ordering::SeqCst);
        debug!("sim rover: all motion stopped");
        Ok(())
    }

    fn release(&self) -> Result<(), RoverError> {
        self.stop_all_motion()?;
        let mut train = self.lock();
        train.lights_on = false;
        train.released = true;
        self.releases.fetch_add(1, Ordering::SeqCst);
        debug!("sim rover: released");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
