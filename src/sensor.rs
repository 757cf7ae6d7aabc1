// Light-dependent resistor wired to one analog input of the bridge board

use tracing::debug;

use crate::motor::pins::{PinBus, Result};

pub struct LightSensor<B> {
    channel: u8,
    bus: B,
}

impl<B: PinBus> LightSensor<B> {
    /// Turn on analog reporting for `channel` so readings start streaming
    pub fn new(channel: u8, mut bus: B) -> Result<Self> {
        bus.report_analog(channel, true)?;
        debug!("Light sensor on analog channel {}", channel);
        Ok(Self { channel, bus })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Latest reading, or None until the board has reported one
    pub fn read(&mut self) -> Result<Option<u16>> {
        self.bus.analog_read(self.channel)
    }
}
