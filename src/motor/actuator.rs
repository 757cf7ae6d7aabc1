// Actuator contract consumed by the motion sequencer

use crate::messages::Direction;

/// Full-scale motor speed (PWM duty)
pub const FULL_SCALE_SPEED: u8 = 255;

/// One motor side as seen by the sequencer.
///
/// Calls are fire-and-forget: they never fail and never return a value.
/// Speeds outside 0..=255 are clamped to `min(255, |speed|)`, never rejected.
pub trait Actuator {
    fn forward(&mut self, speed: i32);
    fn backward(&mut self, speed: i32);
    /// Short the motor leads
    fn brake(&mut self);
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn forward(&mut self, speed: i32) {
        (**self).forward(speed)
    }

    fn backward(&mut self, speed: i32) {
        (**self).backward(speed)
    }

    fn brake(&mut self) {
        (**self).brake()
    }
}

/// Last state commanded to a motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorState {
    pub direction: Direction,
    pub speed: u8,
}

/// Map any requested speed onto the actuator range
pub fn clamp_speed(speed: i32) -> u8 {
    speed.unsigned_abs().min(FULL_SCALE_SPEED as u32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_speed() {
        assert_eq!(clamp_speed(0), 0);
        assert_eq!(clamp_speed(120), 120);
        assert_eq!(clamp_speed(300), 255);
        assert_eq!(clamp_speed(-40), 40);
        assert_eq!(clamp_speed(i32::MIN), 255);
    }
}
