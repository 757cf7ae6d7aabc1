// Robot identity, network, timing and pin configuration
//
// Everything here is read once at startup and never mutated afterwards.
// Values can come from a JSON file; missing keys fall back to the defaults below.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::messages::{Direction, RobotId};

// Identity
pub const DEFAULT_ROBOT_ID: u32 = 1;

// Network: UDP port the control server broadcasts command frames to
pub const DEFAULT_RX_PORT: u16 = 8080;

// Main loop poll interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// Delay between acceleration / deceleration steps
pub const DEFAULT_STEP_DELAY_MS: u64 = 3;

// Experimentally determined pivot duration per degree of rotation
pub const DEFAULT_TURN_MS_PER_DEGREE: f32 = 7.0;

// Differential speed used while pivoting (0-255)
pub const DEFAULT_PIVOT_SPEED: u8 = 50;

// Longest pivot a single command may ask for
pub const DEFAULT_MAX_TURN_MS: u64 = 10_000;

// Highest ramp target a single command may ask for
pub const DEFAULT_MAX_RAMP_SPEED: u32 = 10_000;

// Light sensor telemetry: analog channel, broadcast address, port = base + robot id
pub const DEFAULT_LDR_PIN: u8 = 5;
pub const DEFAULT_TX_ADDR: Ipv4Addr = Ipv4Addr::new(10, 10, 10, 255);
pub const DEFAULT_TX_PORT_BASE: u16 = 8000;

// Serial link to the Firmata bridge board
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_SERIAL_BAUD: u32 = 57_600;

// Highest pin number addressable by a Firmata analog (PWM / analog input) message
const MAX_PWM_PIN: u8 = 15;
// Firmata data bytes are 7-bit
const MAX_DIGITAL_PIN: u8 = 127;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Pin assignment for one side of the H-bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorPins {
    pub in1: u8,
    pub in2: u8,
    pub pwm: u8,
    pub standby: u8,
}

impl MotorPins {
    fn validate(&self, side: &'static str) -> Result<(), ConfigError> {
        if self.pwm > MAX_PWM_PIN {
            return Err(ConfigError::Invalid {
                field: side,
                reason: format!("PWM pin {} is above {}", self.pwm, MAX_PWM_PIN),
            });
        }
        for pin in [self.in1, self.in2, self.standby] {
            if pin > MAX_DIGITAL_PIN {
                return Err(ConfigError::Invalid {
                    field: side,
                    reason: format!("pin {} is above {}", pin, MAX_DIGITAL_PIN),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Unique identifier for this robot
    pub id: RobotId,
    /// Port to listen on for UDP broadcast commands
    pub rx_port: u16,
    /// Emit debug status lines
    pub debug: bool,
    /// Skip frames with malformed numeric fields instead of treating them as zero
    pub strict_fields: bool,
    pub poll_interval_ms: u64,
    pub step_delay_ms: u64,
    pub turn_ms_per_degree: f32,
    pub max_turn_ms: u64,
    pub max_ramp_speed: u32,
    pub pivot_speed: u8,
    /// Motor direction that moves the chassis ahead during a burst
    pub burst_direction: Direction,
    /// Drive real hardware through the Firmata bridge (false = simulated pins)
    pub motors_enabled: bool,
    pub serial_port: String,
    pub serial_baud: u32,
    pub motor_a: MotorPins,
    pub motor_b: MotorPins,
    /// Send light sensor readings back to the control server
    pub ldr_mode: bool,
    /// Analog input channel of the light-dependent resistor
    pub ldr_pin: u8,
    pub tx_addr: Ipv4Addr,
    pub tx_port_base: u16,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            id: RobotId(DEFAULT_ROBOT_ID),
            rx_port: DEFAULT_RX_PORT,
            debug: true,
            strict_fields: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            turn_ms_per_degree: DEFAULT_TURN_MS_PER_DEGREE,
            max_turn_ms: DEFAULT_MAX_TURN_MS,
            max_ramp_speed: DEFAULT_MAX_RAMP_SPEED,
            pivot_speed: DEFAULT_PIVOT_SPEED,
            burst_direction: Direction::Backward,
            motors_enabled: true,
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            serial_baud: DEFAULT_SERIAL_BAUD,
            motor_a: MotorPins {
                in1: 7,
                in2: 6,
                pwm: 5,
                standby: 8,
            },
            motor_b: MotorPins {
                in1: 9,
                in2: 10,
                pwm: 11,
                standby: 8,
            },
            ldr_mode: true,
            ldr_pin: DEFAULT_LDR_PIN,
            tx_addr: DEFAULT_TX_ADDR,
            tx_port_base: DEFAULT_TX_PORT_BASE,
        }
    }
}

impl RobotConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !self.turn_ms_per_degree.is_finite() || self.turn_ms_per_degree < 0.0 {
            return Err(ConfigError::Invalid {
                field: "turn_ms_per_degree",
                reason: format!("{} is not a finite non-negative number", self.turn_ms_per_degree),
            });
        }
        if self.max_turn_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "max_turn_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_ramp_speed > i32::MAX as u32 {
            return Err(ConfigError::Invalid {
                field: "max_ramp_speed",
                reason: format!("must not exceed {}", i32::MAX),
            });
        }
        if self.ldr_pin > MAX_PWM_PIN {
            return Err(ConfigError::Invalid {
                field: "ldr_pin",
                reason: format!("analog channel {} is above {}", self.ldr_pin, MAX_PWM_PIN),
            });
        }
        if self.checked_tx_port().is_none() {
            return Err(ConfigError::Invalid {
                field: "tx_port_base",
                reason: format!("{} + robot id {} is not a valid port", self.tx_port_base, self.id),
            });
        }
        if self.burst_direction == Direction::Stopped {
            return Err(ConfigError::Invalid {
                field: "burst_direction",
                reason: "must be forward or backward".to_string(),
            });
        }
        self.motor_a.validate("motor_a")?;
        self.motor_b.validate("motor_b")?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn checked_tx_port(&self) -> Option<u16> {
        u32::from(self.tx_port_base)
            .checked_add(self.id.0)
            .and_then(|port| u16::try_from(port).ok())
    }

    /// Where light sensor readings go: `tx_addr` on port `tx_port_base + id`
    pub fn telemetry_target(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.tx_addr, self.checked_tx_port().unwrap_or(u16::MAX))
    }

    /// Directive for the log filter: the debug flag gates the status lines
    pub fn log_directive(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
