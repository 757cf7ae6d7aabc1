// Motor control module for the two-wheel differential base
//
// Provides:
// - The actuator contract the motion sequencer drives
// - TB6612 H-bridge driver (pin-level)
// - Pin output backends: Firmata serial bridge and a simulated bus

mod actuator;
pub mod firmata;
pub mod pins;
mod tb6612;

pub use actuator::{clamp_speed, Actuator, MotorState, FULL_SCALE_SPEED};
pub use firmata::FirmataBus;
pub use pins::{MotorError, PinBus, PinMode, SharedPins, SimulatedPins};
pub use tb6612::Tb6612Motor;
