// Poll loop: receive frame -> parse -> report light level -> drive
//
// One maneuver at a time. While a maneuver runs nothing else is polled; frames that
// pile up meanwhile are drained on the next tick and only the newest command is driven.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::pin::pin;

use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

// local imports
use crate::config::RobotConfig;
use crate::messages::Command;
use crate::motor::{
    Actuator, FirmataBus, MotorError, SharedPins, SimulatedPins, Tb6612Motor,
};
use crate::parser::CommandParser;
use crate::sensor::LightSensor;
use crate::sequencer::{BlockingDelay, Delay, MotionTiming, Sequencer};
use crate::transport::{BroadcastReceiver, TelemetrySender};

/// Counters reported when the runtime stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub frames: u64,
    pub commands: u64,
    pub rejected: u64,
    pub maneuvers: u64,
}

pub struct Runtime {
    parser: CommandParser,
    strict_fields: bool,
    stats: RuntimeStats,
}

impl Runtime {
    pub fn new(config: &RobotConfig) -> Self {
        Self {
            parser: CommandParser::new(config.id),
            strict_fields: config.strict_fields,
            stats: RuntimeStats::default(),
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// Filter one raw frame down to this robot's command
    pub fn on_frame(&mut self, raw: &str) -> Option<Command> {
        self.stats.frames += 1;

        if !self.parser.has_command(raw) {
            trace!("Ignoring frame: {:?}", raw);
            return None;
        }

        let cmd = if self.strict_fields {
            match self.parser.try_parse_command(raw) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!("Rejected frame: {}", e);
                    self.stats.rejected += 1;
                    return None;
                }
            }
        } else {
            self.parser.parse_command(raw)
        };

        self.stats.commands += 1;
        debug!("Received command: {:?}", cmd);
        Some(cmd)
    }

    /// Synchronous poll cycle: parse the frame and, if addressed to us, drive to completion
    pub fn handle_frame<M: Actuator, D: Delay>(
        &mut self,
        raw: &str,
        sequencer: &mut Sequencer<M, D>,
    ) -> Option<Command> {
        let cmd = self.on_frame(raw)?;
        sequencer.drive_command(&cmd);
        self.record_maneuver();
        Some(cmd)
    }

    /// Count one maneuver driven to completion
    pub fn record_maneuver(&mut self) {
        self.stats.maneuvers += 1;
    }
}

pub type MotorSequencer = Sequencer<Tb6612Motor<SharedPins>, BlockingDelay>;

/// Open the pin backend shared by the motors and the light sensor
pub fn open_pins(config: &RobotConfig) -> Result<SharedPins, MotorError> {
    let bus = if config.motors_enabled {
        info!("Opening Firmata bridge on {}", config.serial_port);
        let mut bridge = FirmataBus::open_with_baudrate(&config.serial_port, config.serial_baud)?;
        match bridge.query_version() {
            Ok((major, minor)) => info!("Bridge reports Firmata {}.{}", major, minor),
            Err(e) => warn!("Bridge did not report a version: {}", e),
        }
        SharedPins::new(bridge)
    } else {
        info!("Motors disabled, using simulated pins");
        SharedPins::new(SimulatedPins::new())
    };
    Ok(bus)
}

/// Initialize both motor sides on `bus` and build the sequencer
pub fn build_sequencer(config: &RobotConfig, bus: SharedPins) -> Result<MotorSequencer, MotorError> {
    let mut motor_a = Tb6612Motor::new("A", config.motor_a, bus.clone());
    let mut motor_b = Tb6612Motor::new("B", config.motor_b, bus);
    motor_a.initialize()?;
    motor_b.initialize()?;

    Ok(Sequencer::new(
        motor_a,
        motor_b,
        BlockingDelay,
        MotionTiming::from(config),
    ))
}

pub async fn run(config: RobotConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pins = open_pins(&config)?;
    let mut sequencer = build_sequencer(&config, pins.clone())?;

    let listen = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.rx_port);
    let mut receiver = BroadcastReceiver::bind(listen)?;

    let mut telemetry = if config.ldr_mode {
        let sensor = LightSensor::new(config.ldr_pin, pins)?;
        let sender = TelemetrySender::bind(config.telemetry_target()).await?;
        info!(
            "Reporting light level from channel {} to {}",
            sensor.channel(),
            sender.target()
        );
        Some((sensor, sender))
    } else {
        None
    };

    let mut runtime = Runtime::new(&config);
    let mut tick = interval(config.poll_interval());
    // a long maneuver must not be followed by a burst of catch-up ticks
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = pin!(signal::ctrl_c());

    info!(
        "Robot {} listening on {}, polling every {}ms",
        config.id, listen, config.poll_interval_ms
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        // 1. Drain all pending frames (non-blocking), keep latest command
        let mut pending = None;
        while let Some(frame) = receiver.try_recv_frame()? {
            if let Some(cmd) = runtime.on_frame(&frame) {
                if let Some(old) = pending.replace(cmd) {
                    debug!("Command {:?} superseded before it ran", old);
                }
            }
        }

        // 2. Report the light level; a failed reading never stops the robot
        if let Some((sensor, sender)) = telemetry.as_mut() {
            match sensor.read() {
                Ok(Some(value)) => {
                    if let Err(e) = sender.send_reading(value).await {
                        warn!("{}", e);
                    }
                }
                Ok(None) => trace!("No light reading yet"),
                Err(e) => warn!("Light sensor read failed: {}", e),
            }
        }

        // 3. Drive to completion before polling again
        if let Some(cmd) = pending {
            info!(
                "Driving angle={} velocity={} (~{}ms)",
                cmd.angle,
                cmd.velocity,
                sequencer.timing().maneuver_duration(&cmd).as_millis()
            );
            sequencer = tokio::task::spawn_blocking(move || {
                sequencer.drive_command(&cmd);
                sequencer
            })
            .await?;
            runtime.record_maneuver();
        }
    }

    sequencer.full_stop();
    let stats = runtime.stats();
    info!(
        "Stopped: {} frames, {} commands, {} rejected, {} maneuvers",
        stats.frames, stats.commands, stats.rejected, stats.maneuvers
    );
    Ok(())
}
