//! Demo brain: wander forward, turn away from obstacles.
//!
//! The simulated range sensor is advanced by `Perceive` itself: driving
//! forward closes the distance, turning in place faces open space again.

use std::thread;
use std::time::Duration;

use rover_hal::SimRover;
use rover_hal::sim::OPEN_SPACE_CM;
use rover_runtime::{PlanningResult, StrategySet};
use tracing::debug;

/// Simulated ultrasonic read latency.
pub const SENSOR_LATENCY: Duration = Duration::from_millis(50);

/// Distance closed per sensor read at full forward speed.
const CLOSING_CM_PER_READ: f32 = 15.0;

const CRUISE_SPEED: f32 = 0.5;
const TURN_RATE: f32 = 1.0;

/// Assemble the demo strategies for a rover that avoids anything closer
/// than `obstacle_cm`.
pub fn brain(obstacle_cm: f32) -> StrategySet<SimRover> {
    StrategySet::new()
        .with_perceive(|rover: &SimRover, now, cancel| {
            if !cancel.is_cancelled() {
                thread::sleep(SENSOR_LATENCY);
            }
            let distance = next_range(rover);
            rover.set_distance_cm(distance);
            debug!(%now, distance_cm = distance, "range read");
            Ok(())
        })
        .with_plan(move |rover: &SimRover, _, _| {
            Ok(if rover.distance_cm() > obstacle_cm * 2.0 {
                PlanningResult::Plan
            } else {
                PlanningResult::NoPlan
            })
        })
        .with_act(|rover: &SimRover, _, _| rover.drive(CRUISE_SPEED, 0.0))
        .with_react(move |rover: &SimRover, _, _| {
            if rover.distance_cm() < obstacle_cm {
                rover.drive(0.0, TURN_RATE)?;
            }
            Ok(())
        })
}

fn next_range(rover: &SimRover) -> f32 {
    let (left, right) = rover.wheel_speeds();
    if left != right {
        return OPEN_SPACE_CM;
    }
    let forward = (left + right) / 2.0;
    (rover.distance_cm() - forward * CLOSING_CM_PER_READ).clamp(0.0, OPEN_SPACE_CM)
}
