// Firmata serial bridge
//
// The host drives the H-bridge pins of an Arduino running StandardFirmata.
// Messages used:
//   SET_PIN_MODE           [0xF4, pin, mode]
//   SET_DIGITAL_PIN_VALUE  [0xF5, pin, value]
//   ANALOG_MESSAGE         [0xE0 | pin, value & 0x7F, value >> 7]   (pins 0-15)
//   REPORT_ANALOG          [0xC0 | channel, enable]
//                          -> board streams ANALOG_MESSAGE for that channel
//   REPORT_VERSION         [0xF9] -> [0xF9, major, minor]

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use super::pins::{MotorError, PinBus, PinMode, Result};

/// Default serial configuration for StandardFirmata
pub const DEFAULT_BAUDRATE: u32 = 57_600;
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

const SET_PIN_MODE: u8 = 0xF4;
const SET_DIGITAL_PIN_VALUE: u8 = 0xF5;
const ANALOG_MESSAGE: u8 = 0xE0;
const REPORT_ANALOG: u8 = 0xC0;
const REPORT_VERSION: u8 = 0xF9;

const STATUS_BIT: u8 = 0x80;
const COMMAND_MASK: u8 = 0xF0;
const CHANNEL_MASK: u8 = 0x0F;

/// Highest pin an ANALOG_MESSAGE can address
const MAX_ANALOG_PIN: u8 = 0x0F;
/// Data bytes carry 7 bits
const MAX_DATA_BYTE: u8 = 0x7F;

/// Bytes to skip while looking for a version reply (the board may still be streaming)
const MAX_SKIPPED_BYTES: usize = 64;

/// Serial port that can tell how many received bytes are waiting
pub trait BridgePort: Read + Write + Send {
    fn pending(&mut self) -> Result<usize>;
}

impl BridgePort for Box<dyn SerialPort> {
    fn pending(&mut self) -> Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }
}

/// Tracks the latest ANALOG_MESSAGE value per channel from the board's stream
#[derive(Debug, Default)]
struct InputDecoder {
    channel: Option<u8>,
    lsb: Option<u8>,
    latest: [Option<u16>; 16],
}

impl InputDecoder {
    fn push(&mut self, byte: u8) {
        if byte & STATUS_BIT != 0 {
            // Any status byte starts a new message; only analog ones are kept
            self.channel = (byte & COMMAND_MASK == ANALOG_MESSAGE).then_some(byte & CHANNEL_MASK);
            self.lsb = None;
            return;
        }
        let Some(channel) = self.channel else {
            return;
        };
        match self.lsb.take() {
            None => self.lsb = Some(byte),
            Some(lsb) => {
                self.latest[usize::from(channel)] = Some(u16::from(lsb) | u16::from(byte) << 7);
                self.channel = None;
            }
        }
    }

    fn latest(&self, channel: u8) -> Option<u16> {
        self.latest.get(usize::from(channel)).copied().flatten()
    }
}

/// Firmata connection - handles serial communication with the bridge board
pub struct FirmataBus<P = Box<dyn SerialPort>> {
    port: P,
    inputs: InputDecoder,
}

impl FirmataBus {
    /// Open a new connection to the bridge board
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self::from_port(port))
    }
}

impl<P: Read + Write> FirmataBus<P> {
    /// Wrap an already opened port
    pub fn from_port(port: P) -> Self {
        Self {
            port,
            inputs: InputDecoder::default(),
        }
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.port.write_all(message)?;
        self.port.flush()?;
        Ok(())
    }

    /// Ask the board for its protocol version
    pub fn query_version(&mut self) -> Result<(u8, u8)> {
        self.send(&[REPORT_VERSION])?;

        let mut byte = [0u8; 1];
        let mut skipped = 0;
        loop {
            self.port.read_exact(&mut byte)?;
            if byte[0] == REPORT_VERSION {
                break;
            }
            skipped += 1;
            if skipped > MAX_SKIPPED_BYTES {
                return Err(MotorError::InvalidResponse {
                    reason: format!("no version reply within {} bytes", MAX_SKIPPED_BYTES),
                });
            }
        }

        let mut version = [0u8; 2];
        self.port.read_exact(&mut version)?;
        debug!("Firmata protocol version {}.{}", version[0], version[1]);
        Ok((version[0], version[1]))
    }
}

impl<P: BridgePort> FirmataBus<P> {
    /// Feed whatever the board has sent so far through the input decoder
    fn drain_inputs(&mut self) -> Result<()> {
        let pending = self.port.pending()?;
        if pending == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; pending];
        let read = self.port.read(&mut buf)?;
        for &byte in &buf[..read] {
            self.inputs.push(byte);
        }
        Ok(())
    }
}

impl<P: BridgePort> PinBus for FirmataBus<P> {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        let message = set_pin_mode_message(pin, mode)?;
        debug!("Set pin {} mode {:?}", pin, mode);
        self.send(&message)
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()> {
        let message = digital_write_message(pin, high)?;
        self.send(&message)
    }

    fn analog_write(&mut self, pin: u8, duty: u8) -> Result<()> {
        let message = analog_write_message(pin, duty)?;
        self.send(&message)
    }

    fn report_analog(&mut self, channel: u8, enable: bool) -> Result<()> {
        let message = report_analog_message(channel, enable)?;
        debug!("Analog channel {} reporting {}", channel, enable);
        self.send(&message)
    }

    fn analog_read(&mut self, channel: u8) -> Result<Option<u16>> {
        if channel > MAX_ANALOG_PIN {
            return Err(MotorError::UnsupportedPin {
                pin: channel,
                mode: PinMode::Analog,
            });
        }
        self.drain_inputs()?;
        Ok(self.inputs.latest(channel))
    }
}

fn check_pin(pin: u8, mode: PinMode) -> Result<()> {
    if pin > MAX_DATA_BYTE {
        return Err(MotorError::UnsupportedPin { pin, mode });
    }
    Ok(())
}

fn set_pin_mode_message(pin: u8, mode: PinMode) -> Result<[u8; 3]> {
    check_pin(pin, mode)?;
    Ok([SET_PIN_MODE, pin, mode as u8])
}

fn digital_write_message(pin: u8, high: bool) -> Result<[u8; 3]> {
    check_pin(pin, PinMode::Output)?;
    Ok([SET_DIGITAL_PIN_VALUE, pin, high as u8])
}

fn analog_write_message(pin: u8, duty: u8) -> Result<[u8; 3]> {
    if pin > MAX_ANALOG_PIN {
        return Err(MotorError::UnsupportedPin {
            pin,
            mode: PinMode::Pwm,
        });
    }
    Ok([ANALOG_MESSAGE | pin, duty & MAX_DATA_BYTE, duty >> 7])
}

fn report_analog_message(channel: u8, enable: bool) -> Result<[u8; 2]> {
    if channel > MAX_ANALOG_PIN {
        return Err(MotorError::UnsupportedPin {
            pin: channel,
            mode: PinMode::Analog,
        });
    }
    Ok([REPORT_ANALOG | channel, enable as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Serial stand-in: reads come from `rx`, writes land in `tx`
    struct LoopbackPort {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl LoopbackPort {
        fn new(rx: Vec<u8>) -> Self {
            Self {
                rx: Cursor::new(rx),
                tx: Vec::new(),
            }
        }
    }

    impl Read for LoopbackPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.rx.read(buf)
        }
    }

    impl Write for LoopbackPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.tx.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl BridgePort for LoopbackPort {
        fn pending(&mut self) -> Result<usize> {
            let total = self.rx.get_ref().len() as u64;
            Ok((total - self.rx.position().min(total)) as usize)
        }
    }

    #[test]
    fn test_analog_message_splits_7_bit() {
        assert_eq!(analog_write_message(5, 200).unwrap(), [0xE5, 0x48, 0x01]);
        assert_eq!(analog_write_message(11, 50).unwrap(), [0xEB, 50, 0]);
        assert!(matches!(
            analog_write_message(16, 10),
            Err(MotorError::UnsupportedPin { pin: 16, .. })
        ));
    }

    #[test]
    fn test_digital_and_mode_messages() {
        assert_eq!(digital_write_message(7, true).unwrap(), [0xF5, 7, 1]);
        assert_eq!(digital_write_message(6, false).unwrap(), [0xF5, 6, 0]);
        assert_eq!(set_pin_mode_message(5, PinMode::Pwm).unwrap(), [0xF4, 5, 3]);
        assert_eq!(set_pin_mode_message(8, PinMode::Output).unwrap(), [0xF4, 8, 1]);
        assert!(digital_write_message(200, true).is_err());
    }

    #[test]
    fn test_writes_reach_port_in_order() {
        let mut bus = FirmataBus::from_port(LoopbackPort::new(Vec::new()));
        bus.digital_write(7, true).unwrap();
        bus.analog_write(5, 50).unwrap();

        let port = bus.into_inner();
        assert_eq!(port.tx, vec![0xF5, 7, 1, 0xE5, 50, 0]);
    }

    #[test]
    fn test_report_analog_message() {
        assert_eq!(report_analog_message(5, true).unwrap(), [0xC5, 1]);
        assert_eq!(report_analog_message(0, false).unwrap(), [0xC0, 0]);
        assert!(matches!(
            report_analog_message(16, true),
            Err(MotorError::UnsupportedPin { pin: 16, .. })
        ));
    }

    #[test]
    fn test_decoder_keeps_latest_analog_value() {
        let mut decoder = InputDecoder::default();
        // Digital port message, then channel 5 = 511, then channel 5 = 2
        for byte in [0x90, 0x01, 0x00, 0xE5, 0x7F, 0x03, 0xE5, 0x02, 0x00] {
            decoder.push(byte);
        }
        assert_eq!(decoder.latest(5), Some(2));
        assert_eq!(decoder.latest(4), None);
    }

    #[test]
    fn test_decoder_drops_interrupted_message() {
        let mut decoder = InputDecoder::default();
        // ANALOG_MESSAGE cut short by a version reply
        for byte in [0xE5, 0x7F, 0xF9, 0x02, 0x05] {
            decoder.push(byte);
        }
        assert_eq!(decoder.latest(5), None);
    }

    #[test]
    fn test_analog_read_after_reporting() {
        let mut bus = FirmataBus::from_port(LoopbackPort::new(vec![0xE5, 0x7F, 0x03]));
        bus.report_analog(5, true).unwrap();
        assert_eq!(bus.analog_read(5).unwrap(), Some(511));
        // Nothing new on the wire: the last value holds
        assert_eq!(bus.analog_read(5).unwrap(), Some(511));
        assert!(bus.analog_read(16).is_err());
        assert_eq!(bus.into_inner().tx, vec![0xC5, 1]);
    }

    #[test]
    fn test_query_version_skips_noise() {
        let mut bus = FirmataBus::from_port(LoopbackPort::new(vec![0x90, 0x00, 0xF9, 2, 5]));
        assert_eq!(bus.query_version().unwrap(), (2, 5));
        assert_eq!(bus.into_inner().tx, vec![0xF9]);
    }

    #[test]
    fn test_query_version_without_reply_is_io_error() {
        let mut bus = FirmataBus::from_port(LoopbackPort::new(Vec::new()));
        assert!(matches!(bus.query_version(), Err(MotorError::Io(_))));
    }
}
