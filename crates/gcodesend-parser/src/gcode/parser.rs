//! G-Code parser with modal state tracking

use gcodesend_core::GcodeError;

use super::state::tokenize;
use super::{CommandProcessorList, GcodeCommand, GcodeMeta, GcodeState};

/// Outcome of parsing one source line
///
/// `metas` holds one entry for every command the line produced, positional
/// or not. When the line was malformed `error` is set and `metas` holds
/// whatever was emitted before the failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    /// Emitted commands with their state transitions
    pub metas: Vec<GcodeMeta>,
    /// Error raised by the line, if any
    pub error: Option<GcodeError>,
}

impl ParseResult {
    /// Whether the line parsed without error
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// G-Code parser
///
/// Runs each source line through a processor list and tracks the modal
/// state the emitted commands leave the machine in. One parser is used per
/// program; lines must be fed in order.
#[derive(Default)]
pub struct GcodeParser {
    state: GcodeState,
    processors: CommandProcessorList,
}

impl GcodeParser {
    /// Create a parser that emits lines unchanged
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with a processor list
    pub fn with_processors(processors: CommandProcessorList) -> Self {
        Self {
            state: GcodeState::new(),
            processors,
        }
    }

    /// Machine state after the last emitted command
    pub fn state(&self) -> &GcodeState {
        &self.state
    }

    /// The processor list commands pass through
    pub fn processors(&self) -> &CommandProcessorList {
        &self.processors
    }

    /// Parse one line, returning metadata for the positional commands it
    /// produced
    pub fn add_command(
        &mut self,
        line: &str,
        line_number: u32,
    ) -> Result<Vec<GcodeMeta>, GcodeError> {
        let result = self.process_line(line, line_number);
        match result.error {
            Some(err) => Err(err),
            None => Ok(result.metas.into_iter().filter(|m| m.is_motion).collect()),
        }
    }

    /// Parse one line, reporting every emitted command and any error
    pub fn process_line(&mut self, line: &str, line_number: u32) -> ParseResult {
        let line = line.trim_end_matches(['\r', '\n']);
        let command = GcodeCommand::new(line, line_number);

        let emitted = match self.processors.process(&command, &self.state) {
            Ok(emitted) => emitted,
            Err(error) => {
                return ParseResult {
                    metas: Vec::new(),
                    error: Some(error),
                }
            }
        };

        let mut result = ParseResult::default();
        for cmd in emitted {
            if cmd.command.trim().is_empty() {
                continue;
            }
            let words = match tokenize(&cmd.command) {
                Ok(words) => words,
                Err(error) => {
                    result.error = Some(error.at_line(cmd.line_number));
                    break;
                }
            };
            let after = self.state.after(&words);
            result
                .metas
                .push(GcodeMeta::from_transition(&cmd, &words, &self.state, &after));
            self.state = after;
        }

        if let Some(error) = &result.error {
            tracing::debug!("Line {}: {}", line_number, error);
        }
        result
    }
}
