// Turn-and-burst motion sequencer
//
// Every maneuver runs to completion on the calling thread using blocking delays.
// Both sides are commanded from the same thread in lock-step (A then B each step).

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::{
    RobotConfig, DEFAULT_MAX_RAMP_SPEED, DEFAULT_MAX_TURN_MS, DEFAULT_PIVOT_SPEED,
    DEFAULT_STEP_DELAY_MS, DEFAULT_TURN_MS_PER_DEGREE,
};
use crate::messages::{Command, Direction};
use crate::motor::Actuator;

/// Blocking wait between actuator commands
pub trait Delay {
    fn delay_ms(&mut self, ms: u64);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingDelay;

impl Delay for BlockingDelay {
    fn delay_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

/// Tuning constants for the open-loop maneuvers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTiming {
    pub pivot_speed: u8,
    /// Pivot time per degree of rotation
    pub turn_ms_per_degree: f32,
    /// Upper bound on a single pivot
    pub max_turn_ms: u64,
    /// Wait after each ramp step
    pub step_delay_ms: u64,
    /// Upper bound on the ramp target (the actuator still clamps each step to 255)
    pub max_ramp_speed: u32,
    /// Motor direction that moves the chassis ahead; `Stopped` holds both sides braked
    pub burst_direction: Direction,
}

impl Default for MotionTiming {
    fn default() -> Self {
        Self {
            pivot_speed: DEFAULT_PIVOT_SPEED,
            turn_ms_per_degree: DEFAULT_TURN_MS_PER_DEGREE,
            max_turn_ms: DEFAULT_MAX_TURN_MS,
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            max_ramp_speed: DEFAULT_MAX_RAMP_SPEED,
            burst_direction: Direction::Backward,
        }
    }
}

impl From<&RobotConfig> for MotionTiming {
    fn from(config: &RobotConfig) -> Self {
        Self {
            pivot_speed: config.pivot_speed,
            turn_ms_per_degree: config.turn_ms_per_degree,
            max_turn_ms: config.max_turn_ms,
            step_delay_ms: config.step_delay_ms,
            max_ramp_speed: config.max_ramp_speed,
            burst_direction: config.burst_direction,
        }
    }
}

impl MotionTiming {
    /// Pivot time for a heading change, truncated to whole milliseconds
    /// and capped at `max_turn_ms`
    pub fn turn_duration_ms(&self, angle: f32) -> u64 {
        let ms = (angle * self.turn_ms_per_degree).abs();
        if ms.is_nan() {
            return 0;
        }
        // float -> int casts saturate, so inf lands on the cap too
        (ms as u64).min(self.max_turn_ms)
    }

    /// Ramp target for a commanded velocity: truncated, negative and NaN become 0.
    /// Values above full scale ramp the whole way; the actuator clamps each step.
    pub fn ramp_target(&self, velocity: f32) -> u32 {
        (velocity.max(0.0) as u32).min(self.max_ramp_speed)
    }

    /// Wall-clock time a full `drive` takes
    pub fn maneuver_duration(&self, cmd: &Command) -> Duration {
        let steps = 2 * (self.ramp_target(cmd.velocity) as u64 + 1);
        let ramp_ms = steps.saturating_mul(self.step_delay_ms);
        Duration::from_millis(self.turn_duration_ms(cmd.angle))
            .saturating_add(Duration::from_millis(ramp_ms))
    }
}

/// Drives the two motor sides through turn / startup / slowdown / stop maneuvers
pub struct Sequencer<M, D> {
    motor_a: M,
    motor_b: M,
    delay: D,
    timing: MotionTiming,
}

impl<M: Actuator, D: Delay> Sequencer<M, D> {
    pub fn new(motor_a: M, motor_b: M, delay: D, timing: MotionTiming) -> Self {
        Self {
            motor_a,
            motor_b,
            delay,
            timing,
        }
    }

    pub fn timing(&self) -> &MotionTiming {
        &self.timing
    }

    pub fn motor_a(&self) -> &M {
        &self.motor_a
    }

    pub fn motor_b(&self) -> &M {
        &self.motor_b
    }

    /// Hand the motors and delay back
    pub fn into_parts(self) -> (M, M, D) {
        (self.motor_a, self.motor_b, self.delay)
    }

    /// Brake both sides
    pub fn full_stop(&mut self) {
        self.motor_a.brake();
        self.motor_b.brake();
    }

    /// Pivot in place; positive angle is counter-clockwise.
    /// Zero (and NaN) take the clockwise branch with no hold time.
    pub fn turn(&mut self, angle: f32) {
        let pivot = self.timing.pivot_speed as i32;
        if angle > 0.0 {
            // left turn (CCW = +)
            self.motor_a.backward(pivot);
            self.motor_b.forward(pivot);
        } else {
            // right turn (CW = -)
            self.motor_a.forward(pivot);
            self.motor_b.backward(pivot);
        }
        self.delay.delay_ms(self.timing.turn_duration_ms(angle));
        self.full_stop();
    }

    /// Ramp both sides from 0 up to `target` inclusive, one unit per step
    pub fn startup(&mut self, target: u32) {
        for speed in 0..=target {
            self.step(speed);
        }
    }

    /// Ramp both sides from `start` down to 0 inclusive, then brake
    pub fn slowdown(&mut self, start: u32) {
        for speed in (0..=start).rev() {
            self.step(speed);
        }
        self.full_stop();
    }

    /// Accelerate then decelerate: a short controlled advance
    pub fn burst(&mut self, velocity: f32) {
        let speed = self.timing.ramp_target(velocity);
        self.startup(speed);
        self.slowdown(speed);
    }

    /// Turn towards the target, then burst forward
    pub fn drive(&mut self, angle: f32, velocity: f32) {
        debug!("\tDriving...");
        self.turn(angle);
        self.burst(velocity);
        debug!("\tDone.");
    }

    pub fn drive_command(&mut self, cmd: &Command) {
        self.drive(cmd.angle, cmd.velocity);
    }

    fn step(&mut self, speed: u32) {
        let speed = i32::try_from(speed).unwrap_or(i32::MAX);
        match self.timing.burst_direction {
            Direction::Forward => {
                self.motor_a.forward(speed);
                self.motor_b.forward(speed);
            }
            Direction::Backward => {
                self.motor_a.backward(speed);
                self.motor_b.backward(speed);
            }
            Direction::Stopped => self.full_stop(),
        }
        self.delay.delay_ms(self.timing.step_delay_ms);
    }
}
