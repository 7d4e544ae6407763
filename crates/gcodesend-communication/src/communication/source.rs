//! Command sources
//!
//! A [`CommandSource`] feeds the communicator one command at a time so a
//! program never has to be loaded into memory. Sources are pulled only when
//! the send queue runs dry.

use std::collections::VecDeque;
use std::io::Read;

use gcodesend_core::Result;
use gcodesend_parser::GcodeStreamReader;

/// One command produced by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCommand {
    /// Command text without terminator
    pub command: String,
    /// Line in the original program
    pub line_number: Option<u32>,
}

impl SourceCommand {
    /// Command with a known source line
    pub fn new(command: impl Into<String>, line_number: u32) -> Self {
        Self {
            command: command.into(),
            line_number: Some(line_number),
        }
    }
}

/// Lazily produces commands to stream
pub trait CommandSource: Send {
    /// Next command, or `None` when exhausted
    fn next_command(&mut self) -> Result<Option<SourceCommand>>;

    /// Commands left, when known
    fn remaining(&self) -> Option<u64> {
        None
    }
}

/// Streams the records of a preprocessed stream file
pub struct StreamSource<R: Read> {
    reader: GcodeStreamReader<R>,
}

impl<R: Read> StreamSource<R> {
    /// Wrap an open reader; streaming starts at its current record
    pub fn new(reader: GcodeStreamReader<R>) -> Self {
        Self { reader }
    }

    /// Skip the first `n` records, for restarting part way through a file
    pub fn skip_records(&mut self, n: u64) -> Result<u64> {
        self.reader.skip_records(n)
    }
}

impl<R: Read + Send> CommandSource for StreamSource<R> {
    fn next_command(&mut self) -> Result<Option<SourceCommand>> {
        Ok(self.reader.next_record()?.map(|meta| SourceCommand {
            command: meta.command,
            line_number: Some(meta.line_number),
        }))
    }

    fn remaining(&self) -> Option<u64> {
        Some(self.reader.remaining())
    }
}

/// In-memory list of commands
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    commands: VecDeque<SourceCommand>,
}

impl VecSource {
    /// Source over `lines`, numbered from 1
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: lines
                .into_iter()
                .zip(1u32..)
                .map(|(line, n)| SourceCommand::new(line, n))
                .collect(),
        }
    }
}

impl From<Vec<SourceCommand>> for VecSource {
    fn from(commands: Vec<SourceCommand>) -> Self {
        Self {
            commands: commands.into(),
        }
    }
}

impl CommandSource for VecSource {
    fn next_command(&mut self) -> Result<Option<SourceCommand>> {
        Ok(self.commands.pop_front())
    }

    fn remaining(&self) -> Option<u64> {
        Some(self.commands.len() as u64)
    }
}
