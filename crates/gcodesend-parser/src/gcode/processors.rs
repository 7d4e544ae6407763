//! G-Code command processor implementations

use gcodesend_core::{Error, GcodeError, Result};
use regex::Regex;

use super::arc::ArcExpander;
use super::rotation::RotationExpander;
use super::run_from::RunFromProcessor;
use super::state::{format_number, tokenize};
use super::{CommandProcessor, GcodeCommand, GcodeState, ProcessorConfig, ProcessorRegistry};

type ProcessResult = std::result::Result<Vec<GcodeCommand>, GcodeError>;

/// Removes leading and trailing whitespace from G-code commands
///
/// Usually the first processor in the list.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceProcessor;

impl WhitespaceProcessor {
    /// Create a new whitespace processor
    pub fn new() -> Self {
        Self
    }
}

impl CommandProcessor for WhitespaceProcessor {
    fn name(&self) -> &str {
        "whitespace"
    }

    fn description(&self) -> &str {
        "Removes leading and trailing whitespace from G-code commands"
    }

    fn process(&mut self, command: &GcodeCommand, _state: &GcodeState) -> ProcessResult {
        let trimmed = command.command.trim();
        if trimmed.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![command.derive(trimmed)])
        }
    }
}

/// Removes G-code comments from commands
///
/// Parenthesised comments anywhere in the line and everything after a
/// semicolon are dropped. An unclosed parenthesis comments out the rest of
/// the line.
#[derive(Debug, Clone, Default)]
pub struct CommentProcessor;

impl CommentProcessor {
    /// Create a new comment processor
    pub fn new() -> Self {
        Self
    }

    /// Strip comments from one line
    pub fn strip(line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut in_paren = false;
        for ch in line.chars() {
            match ch {
                '(' if !in_paren => in_paren = true,
                ')' if in_paren => in_paren = false,
                ';' if !in_paren => break,
                _ if in_paren => {}
                c => out.push(c),
            }
        }
        out.trim().to_string()
    }
}

impl CommandProcessor for CommentProcessor {
    fn name(&self) -> &str {
        "comment"
    }

    fn description(&self) -> &str {
        "Removes G-code comments (parentheses and semicolon style)"
    }

    fn process(&mut self, command: &GcodeCommand, _state: &GcodeState) -> ProcessResult {
        let stripped = Self::strip(&command.command);
        if stripped.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![command.derive(stripped)])
        }
    }
}

/// Drops commands that are empty after earlier processing
#[derive(Debug, Clone, Default)]
pub struct EmptyLineRemoverProcessor;

impl EmptyLineRemoverProcessor {
    /// Create a new empty line remover processor
    pub fn new() -> Self {
        Self
    }
}

impl CommandProcessor for EmptyLineRemoverProcessor {
    fn name(&self) -> &str {
        "empty_line_remover"
    }

    fn description(&self) -> &str {
        "Removes empty lines from G-code after comment and whitespace processing"
    }

    fn process(&mut self, command: &GcodeCommand, _state: &GcodeState) -> ProcessResult {
        if command.command.trim().is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![command.clone()])
        }
    }
}

/// Default maximum command length, matching small controller line buffers
pub const DEFAULT_MAX_COMMAND_LENGTH: usize = 80;

/// Rejects commands longer than the controller's line buffer
#[derive(Debug, Clone)]
pub struct CommandLengthProcessor {
    config: ProcessorConfig,
    max_length: usize,
}

impl CommandLengthProcessor {
    /// Create with a specific maximum command length
    pub fn new(max_length: usize) -> Self {
        Self {
            config: ProcessorConfig::new().with_option("max_length", max_length),
            max_length,
        }
    }

    /// Build from processor options (`max_length`)
    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(
            config
                .get_parsed("max_length")
                .unwrap_or(DEFAULT_MAX_COMMAND_LENGTH),
        )
    }
}

impl Default for CommandLengthProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COMMAND_LENGTH)
    }
}

impl CommandProcessor for CommandLengthProcessor {
    fn name(&self) -> &str {
        "command_length"
    }

    fn description(&self) -> &str {
        "Validates G-code command length against configurable limit"
    }

    fn process(&mut self, command: &GcodeCommand, _state: &GcodeState) -> ProcessResult {
        let length = command.command.len();
        if length > self.max_length {
            return Err(GcodeError::CommandTooLong {
                line_number: command.line_number,
                text: command.command.clone(),
                length,
                max_length: self.max_length,
            });
        }
        Ok(vec![command.clone()])
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

/// Rounds numeric words to a fixed number of decimals
///
/// `G` and `M` codes keep their value; everything else (axes, offsets,
/// feed, speed) is rounded and trailing zeros are dropped.
#[derive(Debug, Clone)]
pub struct DecimalProcessor {
    config: ProcessorConfig,
    precision: usize,
}

impl DecimalProcessor {
    /// Create with a specific decimal precision
    pub fn new(precision: usize) -> Self {
        Self {
            config: ProcessorConfig::new().with_option("precision", precision),
            precision,
        }
    }

    /// Build from processor options (`precision`)
    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.get_parsed("precision").unwrap_or(4))
    }
}

impl Default for DecimalProcessor {
    fn default() -> Self {
        Self::new(4)
    }
}

impl CommandProcessor for DecimalProcessor {
    fn name(&self) -> &str {
        "decimal"
    }

    fn description(&self) -> &str {
        "Rounds decimal numbers in G-code commands to specified precision"
    }

    fn process(&mut self, command: &GcodeCommand, _state: &GcodeState) -> ProcessResult {
        let words = tokenize(&command.command)?;
        if words.is_empty() {
            return Ok(vec![command.clone()]);
        }
        let rendered: Vec<String> = words
            .iter()
            .map(|w| match w.letter {
                'G' | 'M' | 'N' | 'T' => w.to_string(),
                letter => format!("{}{}", letter, format_number(w.value, self.precision)),
            })
            .collect();
        Ok(vec![command.derive(rendered.join(" "))])
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

/// Drops commands matching a regular expression
#[derive(Debug, Clone)]
pub struct PatternRemover {
    config: ProcessorConfig,
    pattern: Regex,
}

impl PatternRemover {
    /// Create a new pattern remover with the specified regex pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::other(format!("Invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            config: ProcessorConfig::new().with_option("pattern", pattern),
            pattern: regex,
        })
    }

    /// Build from processor options (`pattern`)
    pub fn from_config(config: &ProcessorConfig) -> Result<Self> {
        let pattern = config
            .get_option("pattern")
            .ok_or_else(|| Error::other("pattern_remover requires a 'pattern' option"))?;
        Self::new(pattern)
    }
}

impl CommandProcessor for PatternRemover {
    fn name(&self) -> &str {
        "pattern_remover"
    }

    fn description(&self) -> &str {
        "Removes commands matching a specific pattern"
    }

    fn process(&mut self, command: &GcodeCommand, _state: &GcodeState) -> ProcessResult {
        if self.pattern.is_match(&command.command) {
            tracing::debug!(
                "Line {}: removed '{}' (matches {})",
                command.line_number,
                command.command,
                self.pattern
            );
            return Ok(vec![]);
        }
        Ok(vec![command.clone()])
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

/// Program end handling
///
/// Optionally emits `M5` ahead of `M30` so the spindle stops before the
/// controller resets.
#[derive(Debug, Clone)]
pub struct M30Processor {
    config: ProcessorConfig,
    add_spindle_stop: bool,
}

impl M30Processor {
    /// Create a new M30 processor
    pub fn new(add_spindle_stop: bool) -> Self {
        Self {
            config: ProcessorConfig::new().with_option("add_spindle_stop", add_spindle_stop),
            add_spindle_stop,
        }
    }

    /// Build from processor options (`add_spindle_stop`)
    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.get_parsed("add_spindle_stop").unwrap_or(true))
    }
}

impl Default for M30Processor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CommandProcessor for M30Processor {
    fn name(&self) -> &str {
        "m30"
    }

    fn description(&self) -> &str {
        "Stops the spindle before M30 (program end and reset)"
    }

    fn process(&mut self, command: &GcodeCommand, _state: &GcodeState) -> ProcessResult {
        let words = tokenize(&command.command)?;
        let is_program_end = words.iter().any(|w| w.is('M', 300));
        let stops_spindle = words.iter().any(|w| w.is('M', 50));
        if is_program_end && self.add_spindle_stop && !stops_spindle {
            return Ok(vec![command.generate("M5"), command.clone()]);
        }
        Ok(vec![command.clone()])
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

impl ProcessorRegistry {
    /// Registry holding every built-in processor
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("whitespace", |_| Ok(Box::new(WhitespaceProcessor::new())))
            .register("comment", |_| Ok(Box::new(CommentProcessor::new())))
            .register("empty_line_remover", |_| {
                Ok(Box::new(EmptyLineRemoverProcessor::new()))
            })
            .register("command_length", |c| {
                Ok(Box::new(CommandLengthProcessor::from_config(c)))
            })
            .register("decimal", |c| Ok(Box::new(DecimalProcessor::from_config(c))))
            .register("pattern_remover", |c| {
                Ok(Box::new(PatternRemover::from_config(c)?))
            })
            .register("m30", |c| Ok(Box::new(M30Processor::from_config(c))))
            .register("arc_expander", |c| Ok(Box::new(ArcExpander::from_config(c))))
            .register("rotation_expander", |c| {
                Ok(Box::new(RotationExpander::from_config(c)))
            })
            .register("run_from", |c| Ok(Box::new(RunFromProcessor::from_config(c))));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(processor: &mut dyn CommandProcessor, line: &str) -> Vec<String> {
        processor
            .process(&GcodeCommand::new(line, 1), &GcodeState::new())
            .unwrap()
            .into_iter()
            .map(|c| c.command)
            .collect()
    }

    #[test]
    fn test_whitespace_processor() {
        let mut p = WhitespaceProcessor::new();
        assert_eq!(run(&mut p, "  G1 X1  "), vec!["G1 X1"]);
        assert!(run(&mut p, "   ").is_empty());
    }

    #[test]
    fn test_comment_processor() {
        let mut p = CommentProcessor::new();
        assert_eq!(run(&mut p, "G1 (feed) X1 ; done"), vec!["G1  X1"]);
        assert_eq!(run(&mut p, "G0 X1 (unterminated"), vec!["G0 X1"]);
        assert!(run(&mut p, "(only a comment)").is_empty());
        assert!(run(&mut p, "; header").is_empty());
    }

    #[test]
    fn test_command_length_processor() {
        let mut p = CommandLengthProcessor::new(8);
        assert_eq!(run(&mut p, "G1 X1"), vec!["G1 X1"]);
        let err = p
            .process(&GcodeCommand::new("G1 X100 Y100", 4), &GcodeState::new())
            .unwrap_err();
        assert!(matches!(
            err,
            GcodeError::CommandTooLong {
                line_number: 4,
                length: 12,
                max_length: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_decimal_processor() {
        let mut p = DecimalProcessor::new(3);
        assert_eq!(
            run(&mut p, "G1 X1.23456 Y2.0000 F1200.5"),
            vec!["G1 X1.235 Y2 F1200.5"]
        );
        assert_eq!(run(&mut p, "G90.1"), vec!["G90.1"]);
    }

    #[test]
    fn test_pattern_remover() {
        let mut p = PatternRemover::new(r"^M6\b").unwrap();
        assert!(run(&mut p, "M6 T2").is_empty());
        assert_eq!(run(&mut p, "G1 X1"), vec!["G1 X1"]);
        assert!(PatternRemover::new("(").is_err());
    }

    #[test]
    fn test_m30_processor() {
        let mut p = M30Processor::new(true);
        assert_eq!(run(&mut p, "M30"), vec!["M5", "M30"]);
        assert_eq!(run(&mut p, "M5 M30"), vec!["M5 M30"]);
        assert_eq!(run(&mut p, "M3"), vec!["M3"]);

        let mut off = M30Processor::new(false);
        assert_eq!(run(&mut off, "M30"), vec!["M30"]);
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ProcessorRegistry::with_builtins();
        for name in [
            "whitespace",
            "comment",
            "empty_line_remover",
            "command_length",
            "decimal",
            "m30",
            "arc_expander",
            "rotation_expander",
            "run_from",
        ] {
            assert!(registry.create(name, &ProcessorConfig::new()).is_ok(), "{}", name);
        }
        // Needs its pattern option
        assert!(registry
            .create("pattern_remover", &ProcessorConfig::new())
            .is_err());
        assert!(registry
            .create(
                "pattern_remover",
                &ProcessorConfig::new().with_option("pattern", "^%")
            )
            .is_ok());
    }
}
