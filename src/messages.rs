// Value types shared by the parser, the sequencer and the runtime

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of this robot among all broadcast receivers.
/// Its textual form (the decimal number) is the tag used in command frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RobotId(pub u32);

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RobotId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// Command from the control server -> sequencer
// angle is in degrees (positive = counter-clockwise), velocity is on the 0-255 motor scale
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    pub angle: f32,
    pub velocity: f32,
}

impl Command {
    pub fn new(angle: f32, velocity: f32) -> Self {
        Self { angle, velocity }
    }
}

/// Direction a motor is commanded to spin in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Stopped,
    Forward,
    Backward,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robot_id_display() {
        assert_eq!(RobotId(1).to_string(), "1");
        assert_eq!(RobotId(12).to_string(), "12");
    }

    #[test]
    fn test_robot_id_deserializes_from_plain_number() {
        let id: RobotId = serde_json::from_str("7").unwrap();
        assert_eq!(id, RobotId(7));
    }

    #[test]
    fn test_direction_serde_names() {
        let json = serde_json::to_string(&Direction::Backward).unwrap();
        assert_eq!(json, "\"backward\"");
    }
}
