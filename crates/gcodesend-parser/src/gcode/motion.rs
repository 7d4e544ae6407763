//! Shared helpers for processors that split one move into many

use gcodesend_core::{Axis, GcodeError, Position};

use super::state::{is_positional, tokenize, DistanceMode, GcodeState, MotionMode, Word};
use super::GcodeCommand;

/// A positional command decoded against the state before it
#[derive(Debug, Clone)]
pub(crate) struct DecodedMove {
    pub words: Vec<Word>,
    pub after: GcodeState,
    /// Start point, expressed in the units in effect after the command
    pub start: Position,
    pub end: Position,
}

impl DecodedMove {
    /// Decode `command`, or `None` when it does not move the machine
    pub fn decode(command: &GcodeCommand, state: &GcodeState) -> Result<Option<Self>, GcodeError> {
        let words = tokenize(&command.command)?;
        if !is_positional(&words) {
            return Ok(None);
        }
        let after = state.after(&words);
        Ok(Some(Self {
            start: state.current_point.convert_to(after.units),
            end: after.current_point,
            after,
            words,
        }))
    }

    /// Motion mode the command executes under
    pub fn motion(&self) -> MotionMode {
        self.after.motion_mode
    }

    /// Value of a non-axis word such as `I` or `R`
    pub fn word(&self, letter: char) -> Option<f64> {
        self.words
            .iter()
            .rev()
            .find(|w| w.letter == letter)
            .map(|w| w.value)
    }

    /// Words that must be carried over to the first replacement segment
    fn carried_words(&self) -> impl Iterator<Item = &Word> {
        self.words.iter().filter(|w| match w.letter {
            'G' => !matches!(w.code(), 0 | 10 | 20 | 30),
            'I' | 'J' | 'K' | 'R' | 'N' => false,
            _ => w.axis().is_none(),
        })
    }
}

/// Renders the replacement segments of one move
///
/// The first segment carries the original's modal words (feed, plane,
/// distance mode). Intermediate coordinates are rounded to `precision`; the
/// final segment is written at full precision so it lands exactly on the
/// programmed endpoint.
pub(crate) struct SegmentWriter {
    motion: &'static str,
    precision: usize,
    incremental: bool,
    prefix: Option<String>,
    /// Where the controller will be after the segments written so far
    emitted: Position,
}

impl SegmentWriter {
    pub fn new(decoded: &DecodedMove, motion: MotionMode, precision: usize) -> Self {
        let prefix: Vec<String> = decoded.carried_words().map(|w| w.to_string()).collect();
        Self {
            motion: motion.gcode(),
            precision,
            incremental: decoded.after.distance_mode == DistanceMode::Incremental,
            prefix: (!prefix.is_empty()).then(|| prefix.join(" ")),
            emitted: decoded.start,
        }
    }

    /// Render the segment ending at `target`
    pub fn segment(&mut self, target: &Position, last: bool) -> String {
        let mut text = self.prefix.take().unwrap_or_default();
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(self.motion);

        for axis in Axis::ALL {
            let goal = target.get(axis);
            let from = self.emitted.get(axis);
            if goal == from {
                continue;
            }
            let value = if self.incremental { goal - from } else { goal };
            let rendered = if last {
                exact_number(value)
            } else {
                super::state::format_number(value, self.precision)
            };
            // What the controller will parse back
            let parsed: f64 = rendered.parse().unwrap_or(value);
            let reached = if self.incremental { from + parsed } else { parsed };
            if reached == from {
                continue;
            }
            self.emitted.set(axis, reached);

            text.push(' ');
            text.push(axis.letter());
            text.push_str(&rendered);
        }
        text
    }
}

/// Shortest text that parses back to exactly `value`
pub(crate) fn exact_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{}", value)
    }
}
