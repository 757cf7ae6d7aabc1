// Decoder for 'turn and burst' command frames broadcast by the control server
//
// Frame format: <start><ID>angle,velocity</ID><ID2>angle,velocity</ID2>...<end>
// A frame may carry commands for several robots; each robot only reads its own tag.

use tracing::trace;

use crate::messages::{Command, RobotId};

/// Marker that opens every frame
pub const START_MARKER: &str = "<start>";
/// Marker that closes every frame
pub const END_MARKER: &str = "<end>";

const FIELD_SEPARATOR: char = ',';

/// Errors reported by the strict decoder
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Frame does not carry a command for robot {id}")]
    NotAddressed { id: RobotId },

    #[error("Missing closing tag </{id}>")]
    MissingClosingTag { id: RobotId },

    #[error("Missing ',' between angle and velocity in {payload:?}")]
    MissingSeparator { payload: String },

    #[error("Malformed {field} field: {text:?}")]
    MalformedField { field: &'static str, text: String },
}

/// Extracts the command addressed to one robot from raw broadcast frames
#[derive(Debug, Clone)]
pub struct CommandParser {
    id: RobotId,
    open_tag: String,
    close_tag: String,
}

impl CommandParser {
    pub fn new(id: RobotId) -> Self {
        Self {
            id,
            open_tag: format!("<{}>", id),
            close_tag: format!("</{}>", id),
        }
    }

    pub fn id(&self) -> RobotId {
        self.id
    }

    /// True when the frame has both markers and this robot's opening tag.
    ///
    /// The full bracketed tag is matched, so robot 1 never matches `<12>`.
    pub fn has_command(&self, raw: &str) -> bool {
        raw.contains(&self.open_tag) && raw.contains(START_MARKER) && raw.contains(END_MARKER)
    }

    /// Decode this robot's command. Fields that are not numeric decode as zero.
    ///
    /// Only meaningful after [`has_command`](Self::has_command) returned true;
    /// a frame without this robot's tag decodes to the zero command.
    pub fn parse_command(&self, raw: &str) -> Command {
        let Some((payload, _)) = self.payload(raw) else {
            return Command::default();
        };

        match payload.split_once(FIELD_SEPARATOR) {
            Some((angle, velocity)) => Command {
                angle: leading_number(angle),
                velocity: leading_number(velocity),
            },
            None => Command {
                angle: leading_number(payload),
                velocity: 0.0,
            },
        }
    }

    /// Strict decode: every structural problem and every malformed field is an error.
    pub fn try_parse_command(&self, raw: &str) -> Result<Command, ParseError> {
        if !self.has_command(raw) {
            return Err(ParseError::NotAddressed { id: self.id });
        }

        let (payload, closed) = self
            .payload(raw)
            .ok_or(ParseError::NotAddressed { id: self.id })?;
        if !closed {
            return Err(ParseError::MissingClosingTag { id: self.id });
        }

        let (angle, velocity) =
            payload
                .split_once(FIELD_SEPARATOR)
                .ok_or_else(|| ParseError::MissingSeparator {
                    payload: payload.to_string(),
                })?;

        Ok(Command {
            angle: strict_number("angle", angle)?,
            velocity: strict_number("velocity", velocity)?,
        })
    }

    /// `has_command` followed by `parse_command`
    pub fn extract(&self, raw: &str) -> Option<Command> {
        if !self.has_command(raw) {
            trace!("Frame not addressed to robot {}", self.id);
            return None;
        }
        Some(self.parse_command(raw))
    }

    /// Text between this robot's opening tag and its closing tag.
    /// Without a closing tag the payload runs to the end of the frame (flag is false).
    fn payload<'a>(&self, raw: &'a str) -> Option<(&'a str, bool)> {
        let start = raw.find(&self.open_tag)? + self.open_tag.len();
        let rest = &raw[start..];
        match rest.find(&self.close_tag) {
            Some(end) => Some((&rest[..end], true)),
            None => Some((rest, false)),
        }
    }
}

/// Build a frame carrying one command per robot, as the control server does
pub fn encode_frame(commands: &[(RobotId, Command)]) -> String {
    let mut frame = String::from(START_MARKER);
    for (id, cmd) in commands {
        frame.push_str(&format!(
            "<{id}>{}{FIELD_SEPARATOR}{}</{id}>",
            cmd.angle, cmd.velocity
        ));
    }
    frame.push_str(END_MARKER);
    frame
}

/// Convert the numeric prefix of `text` (after leading whitespace) to a float.
/// Trailing garbage is ignored; no numeric prefix or a non-finite value gives 0.
fn leading_number(text: &str) -> f32 {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let int_end = digits_from(end);
    let mut digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        digits += frac_end - (end + 1);
        end = frac_end;
    }

    if digits == 0 {
        return 0.0;
    }

    // exponent only counts when it has digits
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    s[..end]
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn strict_number(field: &'static str, text: &str) -> Result<f32, ParseError> {
    text.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError::MalformedField {
            field,
            text: text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(id: u32) -> CommandParser {
        CommandParser::new(RobotId(id))
    }

    #[test]
    fn test_addressed_frame_is_detected_and_parsed() {
        let raw = "<start><1>45,80</1><end>";
        let p = parser(1);
        assert!(p.has_command(raw));
        assert_eq!(p.parse_command(raw), Command::new(45.0, 80.0));
    }

    #[test]
    fn test_other_robot_does_not_match() {
        let raw = "<start><1>45,80</1><end>";
        assert!(!parser(2).has_command(raw));
    }

    #[test]
    fn test_no_prefix_collision_with_longer_id() {
        let raw = "<start><12>45,80</12><end>";
        assert!(!parser(1).has_command(raw));
        assert!(!parser(2).has_command(raw));
        assert!(parser(12).has_command(raw));
        assert_eq!(parser(1).extract(raw), None);
    }

    #[test]
    fn test_missing_markers_rejected() {
        let p = parser(1);
        assert!(!p.has_command("<1>45,80</1><end>"));
        assert!(!p.has_command("<start><1>45,80</1>"));
        assert!(!p.has_command("<start>45,80<end>"));
        assert!(!p.has_command(""));
    }

    #[test]
    fn test_multi_robot_frame_picks_own_command() {
        let raw = "<start><12>10,20</12><1>-30.5,120</1><2>90,5</2><end>";
        assert_eq!(parser(1).parse_command(raw), Command::new(-30.5, 120.0));
        assert_eq!(parser(2).parse_command(raw), Command::new(90.0, 5.0));
        assert_eq!(parser(12).parse_command(raw), Command::new(10.0, 20.0));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let raw = "<start><3>-15,60</3><end>";
        let p = parser(3);
        assert_eq!(p.parse_command(raw), p.parse_command(raw));
        assert_eq!(raw, "<start><3>-15,60</3><end>");
    }

    #[test]
    fn test_malformed_fields_become_zero() {
        let p = parser(1);
        assert_eq!(
            p.parse_command("<start><1>abc,80</1><end>"),
            Command::new(0.0, 80.0)
        );
        assert_eq!(
            p.parse_command("<start><1>45,fast</1><end>"),
            Command::new(45.0, 0.0)
        );
    }

    #[test]
    fn test_missing_separator_gives_zero_velocity() {
        let p = parser(1);
        assert_eq!(p.parse_command("<start><1>45</1><end>"), Command::new(45.0, 0.0));
    }

    #[test]
    fn test_missing_closing_tag_reads_to_end() {
        let p = parser(1);
        assert_eq!(p.parse_command("<start><1>20,40<end>"), Command::new(20.0, 40.0));
    }

    #[test]
    fn test_leading_number_rules() {
        assert_eq!(leading_number("45"), 45.0);
        assert_eq!(leading_number("  -12.5"), -12.5);
        assert_eq!(leading_number("+3"), 3.0);
        assert_eq!(leading_number("80abc"), 80.0);
        assert_eq!(leading_number(".5"), 0.5);
        assert_eq!(leading_number("5."), 5.0);
        assert_eq!(leading_number("1e2"), 100.0);
        assert_eq!(leading_number("2e"), 2.0);
        assert_eq!(leading_number("-"), 0.0);
        assert_eq!(leading_number("."), 0.0);
        assert_eq!(leading_number(""), 0.0);
        assert_eq!(leading_number("1e99"), 0.0);
    }

    #[test]
    fn test_strict_parse_reports_errors() {
        let p = parser(1);
        assert_eq!(
            p.try_parse_command("<start><1> 45 , 80 </1><end>"),
            Ok(Command::new(45.0, 80.0))
        );
        assert_eq!(
            p.try_parse_command("<start><2>45,80</2><end>"),
            Err(ParseError::NotAddressed { id: RobotId(1) })
        );
        assert_eq!(
            p.try_parse_command("<start><1>45,80<end>"),
            Err(ParseError::MissingClosingTag { id: RobotId(1) })
        );
        assert!(matches!(
            p.try_parse_command("<start><1>45</1><end>"),
            Err(ParseError::MissingSeparator { .. })
        ));
        assert_eq!(
            p.try_parse_command("<start><1>45,80x</1><end>"),
            Err(ParseError::MalformedField {
                field: "velocity",
                text: "80x".to_string()
            })
        );
    }

    #[test]
    fn test_encoded_frame_is_decodable() {
        let frame = encode_frame(&[
            (RobotId(1), Command::new(45.0, 80.0)),
            (RobotId(2), Command::new(-30.0, 120.0)),
        ]);
        assert_eq!(frame, "<start><1>45,80</1><2>-30,120</2><end>");
        assert_eq!(parser(2).extract(&frame), Some(Command::new(-30.0, 120.0)));
    }
}
