// Motion-control runtime for a two-wheeled turn-and-burst robot
//
// Frames broadcast by the control server are filtered by robot id (parser) and turned
// into timed two-motor maneuvers (sequencer) driven through a TB6612 H-bridge.
// Light sensor readings go back to the server over UDP (sensor, transport).

pub mod config;
pub mod messages;
pub mod motor;
pub mod parser;
pub mod runtime;
pub mod sensor;
pub mod sequencer;
pub mod transport;

pub use config::RobotConfig;
pub use messages::{Command, Direction, RobotId};
pub use parser::CommandParser;
pub use sequencer::Sequencer;
