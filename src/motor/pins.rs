// Pin-level capability of the bridge board: H-bridge outputs plus analog inputs
//
// Backends: the Firmata serial bridge (real hardware) and SimulatedPins (logs only).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

/// Error types for pin output
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pin {pin} cannot be used for {mode:?}")]
    UnsupportedPin { pin: u8, mode: PinMode },

    #[error("Invalid response from bridge: {reason}")]
    InvalidResponse { reason: String },

    #[error("Pin bus lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// Pin modes (Firmata numbering)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input = 0,
    Analog = 2,
    Output = 1,
    Pwm = 3,
}

pub trait PinBus: Send {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;
    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()>;
    /// Write a PWM duty cycle (0-255)
    fn analog_write(&mut self, pin: u8, duty: u8) -> Result<()>;
    /// Start or stop streaming an analog input channel
    fn report_analog(&mut self, channel: u8, enable: bool) -> Result<()>;
    /// Latest reading of a reported channel (10-bit on most boards)
    fn analog_read(&mut self, channel: u8) -> Result<Option<u16>>;
}

impl<T: PinBus + ?Sized> PinBus for Box<T> {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        (**self).set_pin_mode(pin, mode)
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()> {
        (**self).digital_write(pin, high)
    }

    fn analog_write(&mut self, pin: u8, duty: u8) -> Result<()> {
        (**self).analog_write(pin, duty)
    }

    fn report_analog(&mut self, channel: u8, enable: bool) -> Result<()> {
        (**self).report_analog(channel, enable)
    }

    fn analog_read(&mut self, channel: u8) -> Result<Option<u16>> {
        (**self).analog_read(channel)
    }
}

/// One pin bus shared by both motor sides (they sit on the same bridge board)
#[derive(Clone)]
pub struct SharedPins {
    inner: Arc<Mutex<Box<dyn PinBus>>>,
}

impl SharedPins {
    pub fn new(pins: impl PinBus + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(pins))),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut dyn PinBus) -> Result<R>) -> Result<R> {
        let mut guard = self.inner.lock().map_err(|_| MotorError::Poisoned)?;
        f(&mut **guard)
    }
}

impl PinBus for SharedPins {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.with(|pins| pins.set_pin_mode(pin, mode))
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()> {
        self.with(|pins| pins.digital_write(pin, high))
    }

    fn analog_write(&mut self, pin: u8, duty: u8) -> Result<()> {
        self.with(|pins| pins.analog_write(pin, duty))
    }

    fn report_analog(&mut self, channel: u8, enable: bool) -> Result<()> {
        self.with(|pins| pins.report_analog(channel, enable))
    }

    fn analog_read(&mut self, channel: u8) -> Result<Option<u16>> {
        self.with(|pins| pins.analog_read(channel))
    }
}

/// Pin level as seen by the simulated bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Digital(bool),
    Pwm(u8),
}

/// In-memory pin bus for running without hardware
#[derive(Debug, Default)]
pub struct SimulatedPins {
    modes: HashMap<u8, PinMode>,
    levels: HashMap<u8, PinLevel>,
    reported: HashMap<u8, bool>,
    inputs: HashMap<u8, u16>,
}

impl SimulatedPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        self.modes.get(&pin).copied()
    }

    pub fn level(&self, pin: u8) -> Option<PinLevel> {
        self.levels.get(&pin).copied()
    }

    /// Value an analog channel reads once reporting is on
    pub fn set_analog_input(&mut self, channel: u8, value: u16) {
        self.inputs.insert(channel, value);
    }

    pub fn is_reporting(&self, channel: u8) -> bool {
        self.reported.get(&channel).copied().unwrap_or(false)
    }
}

impl PinBus for SimulatedPins {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        debug!("sim: pin {} mode {:?}", pin, mode);
        self.modes.insert(pin, mode);
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()> {
        trace!("sim: pin {} <- {}", pin, if high { "HIGH" } else { "LOW" });
        self.levels.insert(pin, PinLevel::Digital(high));
        Ok(())
    }

    fn analog_write(&mut self, pin: u8, duty: u8) -> Result<()> {
        trace!("sim: pin {} <- pwm {}", pin, duty);
        self.levels.insert(pin, PinLevel::Pwm(duty));
        Ok(())
    }

    fn report_analog(&mut self, channel: u8, enable: bool) -> Result<()> {
        debug!("sim: analog channel {} reporting {}", channel, enable);
        self.reported.insert(channel, enable);
        Ok(())
    }

    fn analog_read(&mut self, channel: u8) -> Result<Option<u16>> {
        if !self.is_reporting(channel) {
            return Ok(None);
        }
        // Unwired simulated inputs float at zero
        Ok(Some(self.inputs.get(&channel).copied().unwrap_or(0)))
    }
}
