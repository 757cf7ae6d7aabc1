// TB6612 H-bridge driver for one motor side
//
// Pin truth table:
//   forward   IN1=H IN2=L  PWM=duty
//   backward  IN1=L IN2=H  PWM=duty
//   brake     IN1=H IN2=H  STBY=H   (leads shorted)
//   off       IN1=L IN2=L  STBY=H   (coast)
//   standby   STBY=L

use tracing::{debug, warn};

use super::actuator::{clamp_speed, Actuator, MotorState};
use super::pins::{PinBus, PinMode, Result};
use crate::config::MotorPins;
use crate::messages::Direction;

pub struct Tb6612Motor<P> {
    name: &'static str,
    pins: MotorPins,
    bus: P,
    state: MotorState,
}

impl<P: PinBus> Tb6612Motor<P> {
    pub fn new(name: &'static str, pins: MotorPins, bus: P) -> Self {
        Self {
            name,
            pins,
            bus,
            state: MotorState::default(),
        }
    }

    /// Configure pin modes and leave the motor braked
    pub fn initialize(&mut self) -> Result<()> {
        debug!("Initializing motor {} on pins {:?}", self.name, self.pins);
        for pin in [self.pins.in1, self.pins.in2, self.pins.standby] {
            self.bus.set_pin_mode(pin, PinMode::Output)?;
        }
        self.bus.set_pin_mode(self.pins.pwm, PinMode::Pwm)?;
        self.try_brake()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn direction(&self) -> Direction {
        self.state.direction
    }

    pub fn speed(&self) -> u8 {
        self.state.speed
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn bus(&self) -> &P {
        &self.bus
    }

    /// Signed speed: positive forward, negative backward, zero brakes
    pub fn move_at_speed(&mut self, speed: i32) {
        let result = match speed.signum() {
            1 => self.set_direction(Direction::Forward),
            -1 => self.set_direction(Direction::Backward),
            _ => self.try_brake(),
        }
        .and_then(|_| self.write_speed(speed));
        self.report(result);
    }

    /// Flip the spin direction, keeping the current duty
    pub fn reverse(&mut self) {
        let next = match self.state.direction {
            Direction::Forward => Direction::Backward,
            _ => Direction::Forward,
        };
        let result = self.set_direction(next);
        self.report(result);
    }

    /// Let the motor coast
    pub fn off(&mut self) {
        let result = self
            .write_bridge(false, false)
            .and_then(|_| self.bus.digital_write(self.pins.standby, true));
        self.state.direction = Direction::Stopped;
        self.report(result);
    }

    /// Put the driver chip in standby
    pub fn standby(&mut self) {
        let result = self.bus.digital_write(self.pins.standby, false);
        self.report(result);
    }

    fn try_brake(&mut self) -> Result<()> {
        self.state.direction = Direction::Stopped;
        self.write_bridge(true, true)?;
        self.bus.digital_write(self.pins.standby, true)
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        self.state.direction = direction;
        match direction {
            Direction::Forward => self.write_bridge(true, false),
            Direction::Backward => self.write_bridge(false, true),
            Direction::Stopped => self.write_bridge(true, true),
        }
    }

    fn write_bridge(&mut self, in1: bool, in2: bool) -> Result<()> {
        self.bus.digital_write(self.pins.in1, in1)?;
        self.bus.digital_write(self.pins.in2, in2)
    }

    fn write_speed(&mut self, speed: i32) -> Result<()> {
        self.state.speed = clamp_speed(speed);
        self.bus.analog_write(self.pins.pwm, self.state.speed)
    }

    fn report(&self, result: Result<()>) {
        if let Err(e) = result {
            warn!("Motor {} pin write failed: {}", self.name, e);
        }
    }
}

impl<P: PinBus> Actuator for Tb6612Motor<P> {
    fn forward(&mut self, speed: i32) {
        let result = self
            .set_direction(Direction::Forward)
            .and_then(|_| self.write_speed(speed));
        self.report(result);
    }

    fn backward(&mut self, speed: i32) {
        let result = self
            .set_direction(Direction::Backward)
            .and_then(|_| self.write_speed(speed));
        self.report(result);
    }

    fn brake(&mut self) {
        let result = self.try_brake();
        self.report(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::pins::{PinLevel, SimulatedPins};

    const PINS: MotorPins = MotorPins {
        in1: 7,
        in2: 6,
        pwm: 5,
        standby: 8,
    };

    fn motor() -> Tb6612Motor<SimulatedPins> {
        let mut motor = Tb6612Motor::new("A", PINS, SimulatedPins::new());
        motor.initialize().unwrap();
        motor
    }

    fn level(motor: &Tb6612Motor<SimulatedPins>, pin: u8) -> Option<PinLevel> {
        motor.bus().level(pin)
    }

    #[test]
    fn test_initialize_sets_modes_and_brakes() {
        let motor = motor();
        assert_eq!(motor.bus().mode(7), Some(PinMode::Output));
        assert_eq!(motor.bus().mode(5), Some(PinMode::Pwm));
        assert_eq!(level(&motor, 7), Some(PinLevel::Digital(true)));
        assert_eq!(level(&motor, 6), Some(PinLevel::Digital(true)));
        assert_eq!(motor.direction(), Direction::Stopped);
    }

    #[test]
    fn test_forward_and_backward_pins() {
        let mut motor = motor();
        motor.forward(120);
        assert_eq!(level(&motor, 7), Some(PinLevel::Digital(true)));
        assert_eq!(level(&motor, 6), Some(PinLevel::Digital(false)));
        assert_eq!(level(&motor, 5), Some(PinLevel::Pwm(120)));
        assert_eq!(motor.direction(), Direction::Forward);

        motor.backward(60);
        assert_eq!(level(&motor, 7), Some(PinLevel::Digital(false)));
        assert_eq!(level(&motor, 6), Some(PinLevel::Digital(true)));
        assert_eq!(level(&motor, 5), Some(PinLevel::Pwm(60)));
        assert_eq!(motor.direction(), Direction::Backward);
    }

    #[test]
    fn test_speed_is_clamped_not_rejected() {
        let mut motor = motor();
        motor.forward(300);
        assert_eq!(motor.speed(), 255);
        motor.backward(-40);
        assert_eq!(motor.speed(), 40);
        assert_eq!(motor.direction(), Direction::Backward);
    }

    #[test]
    fn test_move_at_speed_sign_selects_direction() {
        let mut motor = motor();
        motor.move_at_speed(-80);
        assert_eq!(motor.direction(), Direction::Backward);
        assert_eq!(motor.speed(), 80);

        motor.move_at_speed(0);
        assert_eq!(motor.direction(), Direction::Stopped);
        assert_eq!(level(&motor, 5), Some(PinLevel::Pwm(0)));
    }

    #[test]
    fn test_reverse_keeps_speed() {
        let mut motor = motor();
        motor.forward(90);
        motor.reverse();
        assert_eq!(motor.direction(), Direction::Backward);
        assert_eq!(motor.speed(), 90);
        motor.reverse();
        assert_eq!(motor.direction(), Direction::Forward);
    }

    #[test]
    fn test_off_and_standby() {
        let mut motor = motor();
        motor.forward(90);
        motor.off();
        assert_eq!(level(&motor, 7), Some(PinLevel::Digital(false)));
        assert_eq!(level(&motor, 6), Some(PinLevel::Digital(false)));
        assert_eq!(motor.direction(), Direction::Stopped);

        motor.standby();
        assert_eq!(level(&motor, 8), Some(PinLevel::Digital(false)));
    }
}
