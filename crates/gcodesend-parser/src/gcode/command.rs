//! G-Code command and per-command metadata types

use gcodesend_core::{Axis, Position};
use serde::{Deserialize, Serialize};

use super::state::{is_positional, GcodeState, MotionMode, Word};

/// A command travelling through the processor pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcodeCommand {
    /// Text that will be sent to the controller
    pub command: String,
    /// Source line the command came from
    pub original: String,
    /// Line number in the source file
    pub line_number: u32,
    /// Synthesized by a processor rather than read from the source
    pub generated: bool,
}

impl GcodeCommand {
    /// Create a command for a source line
    pub fn new(line: impl Into<String>, line_number: u32) -> Self {
        let line = line.into();
        Self {
            command: line.clone(),
            original: line,
            line_number,
            generated: false,
        }
    }

    /// Derive a command with different text from the same source line
    pub fn derive(&self, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            original: self.original.clone(),
            line_number: self.line_number,
            generated: self.generated,
        }
    }

    /// Derive a synthesized command attributed to the same source line
    pub fn generate(&self, command: impl Into<String>) -> Self {
        Self {
            generated: true,
            ..self.derive(command)
        }
    }
}

impl std::fmt::Display for GcodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.line_number, self.command)
    }
}

/// Result of emitting one command: what was sent and how the machine moved
///
/// Built once, never modified, written once to a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcodeMeta {
    /// Line number in the source file
    pub line_number: u32,
    /// Source line text
    pub original: String,
    /// Command text to send
    pub command: String,
    /// Position before the command
    pub start: Position,
    /// Position after the command
    pub end: Position,
    /// Emitted as G2/G3
    pub is_arc: bool,
    /// Only Z changed
    pub is_z_movement: bool,
    /// Emitted as G0
    pub is_fast_traverse: bool,
    /// A rotary axis changed
    pub is_rotation: bool,
    /// The command moves at least one axis
    pub is_motion: bool,
    /// Feed rate in effect after the command
    pub feed_rate: f64,
    /// Spindle speed in effect after the command
    pub spindle_speed: f64,
}

const FLAG_ARC: u8 = 1 << 0;
const FLAG_Z_MOVEMENT: u8 = 1 << 1;
const FLAG_FAST_TRAVERSE: u8 = 1 << 2;
const FLAG_ROTATION: u8 = 1 << 3;
const FLAG_MOTION: u8 = 1 << 4;

impl GcodeMeta {
    /// Describe the transition produced by `command`
    pub fn from_transition(
        command: &GcodeCommand,
        words: &[Word],
        before: &GcodeState,
        after: &GcodeState,
    ) -> Self {
        let start = before.current_point.convert_to(after.units);
        let end = after.current_point;
        let is_motion = is_positional(words);

        let changed = |axis: Axis| start.get(axis) != end.get(axis);
        let is_rotation = is_motion && [Axis::A, Axis::B, Axis::C].into_iter().any(changed);
        let is_z_movement = is_motion
            && changed(Axis::Z)
            && !Axis::ALL
                .into_iter()
                .filter(|a| *a != Axis::Z)
                .any(changed);

        Self {
            line_number: command.line_number,
            original: command.original.clone(),
            command: command.command.clone(),
            start,
            end,
            is_arc: is_motion && after.motion_mode.is_arc(),
            is_z_movement,
            is_fast_traverse: is_motion && after.motion_mode == MotionMode::Rapid,
            is_rotation,
            is_motion,
            feed_rate: after.feed_rate,
            spindle_speed: after.spindle_speed,
        }
    }

    /// Flags packed into one byte
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.is_arc {
            flags |= FLAG_ARC;
        }
        if self.is_z_movement {
            flags |= FLAG_Z_MOVEMENT;
        }
        if self.is_fast_traverse {
            flags |= FLAG_FAST_TRAVERSE;
        }
        if self.is_rotation {
            flags |= FLAG_ROTATION;
        }
        if self.is_motion {
            flags |= FLAG_MOTION;
        }
        flags
    }

    /// Restore flags from a packed byte
    pub fn set_flags(&mut self, flags: u8) {
        self.is_arc = flags & FLAG_ARC != 0;
        self.is_z_movement = flags & FLAG_Z_MOVEMENT != 0;
        self.is_fast_traverse = flags & FLAG_FAST_TRAVERSE != 0;
        self.is_rotation = flags & FLAG_ROTATION != 0;
        self.is_motion = flags & FLAG_MOTION != 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::state::tokenize;

    fn meta(before: &GcodeState, line: &str) -> GcodeMeta {
        let words = tokenize(line).unwrap();
        let after = before.after(&words);
        GcodeMeta::from_transition(&GcodeCommand::new(line, 1), &words, before, &after)
    }

    #[test]
    fn test_rapid_flags() {
        let m = meta(&GcodeState::new(), "G0 X10");
        assert!(m.is_motion);
        assert!(m.is_fast_traverse);
        assert!(!m.is_arc);
        assert!(!m.is_z_movement);
        assert_eq!(m.end.x, 10.0);
    }

    #[test]
    fn test_z_only_flag() {
        let m = meta(&GcodeState::new(), "G1 Z-1 F100");
        assert!(m.is_z_movement);
        assert!(!m.is_fast_traverse);
        assert_eq!(m.feed_rate, 100.0);
    }

    #[test]
    fn test_rotation_flag() {
        let m = meta(&GcodeState::new(), "G1 X1 A90");
        assert!(m.is_rotation);
        assert!(!m.is_z_movement);
    }

    #[test]
    fn test_non_positional() {
        let m = meta(&GcodeState::new(), "M3 S1000");
        assert!(!m.is_motion);
        assert_eq!(m.flags(), 0);
        assert_eq!(m.spindle_speed, 1000.0);
    }

    #[test]
    fn test_flags_byte() {
        let mut m = meta(&GcodeState::new(), "G0 Z5");
        let flags = m.flags();
        assert_eq!(flags, FLAG_Z_MOVEMENT | FLAG_FAST_TRAVERSE | FLAG_MOTION);
        m.set_flags(FLAG_ARC);
        assert!(m.is_arc);
        assert!(!m.is_motion);
    }
}
