//! File preprocessing
//!
//! Streams a G-code text file line by line through a [`GcodeParser`] and
//! persists every emitted command to a stream file. Neither the source nor
//! the result is held in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, Write};
use std::path::Path;
use std::time::Instant;

use gcodesend_core::{Error, GcodeError, Result};
use serde::{Deserialize, Serialize};

use crate::gcode::{GcodeParser, GcodeStreamWriter};

/// Buffer size for reading large files (256 KB)
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// What to do when a source line fails to parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorPolicy {
    /// Record the error and continue with the next line
    #[default]
    Skip,
    /// Stop at the first malformed line
    Abort,
}

/// Summary of one preprocessing run
#[derive(Debug, Clone, Default)]
pub struct PreprocessStats {
    /// Source lines read
    pub lines_read: u64,
    /// Records written to the stream
    pub commands_written: u64,
    /// Command bytes written, one terminator byte per command included
    pub total_command_bytes: u64,
    /// Malformed lines, each carrying its line number
    pub errors: Vec<GcodeError>,
    /// Time taken (milliseconds)
    pub elapsed_ms: u64,
}

impl PreprocessStats {
    /// Whether every line parsed
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Preprocess `input` into the stream file `output`
///
/// # Errors
/// I/O and stream failures, or the first parse error under
/// [`ParseErrorPolicy::Abort`].
pub fn preprocess_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    parser: &mut GcodeParser,
    policy: ParseErrorPolicy,
) -> Result<PreprocessStats> {
    let input = input.as_ref();
    let file = File::open(input).map_err(|e| {
        Error::other(format!("Failed to open {}: {}", input.display(), e))
    })?;
    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let mut writer = GcodeStreamWriter::create(output.as_ref())?;

    let mut stats = preprocess_reader(reader, &mut writer, parser, policy)?;
    stats.total_command_bytes = writer.total_command_bytes();
    writer.finish()?;

    tracing::info!(
        "Preprocessed {}: {} lines, {} commands, {} errors in {}ms",
        input.display(),
        stats.lines_read,
        stats.commands_written,
        stats.errors.len(),
        stats.elapsed_ms
    );
    Ok(stats)
}

/// Preprocess lines from `reader` into an open stream writer
///
/// Line numbers start at 1. Invalid UTF-8 is replaced rather than rejected.
pub fn preprocess_reader<R, W>(
    mut reader: R,
    writer: &mut GcodeStreamWriter<W>,
    parser: &mut GcodeParser,
    policy: ParseErrorPolicy,
) -> Result<PreprocessStats>
where
    R: BufRead,
    W: Write + Seek,
{
    let started = Instant::now();
    let mut stats = PreprocessStats::default();
    let mut buf = Vec::with_capacity(256);
    let mut line_number = 0u32;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_number = line_number.saturating_add(1);
        stats.lines_read += 1;

        let line = String::from_utf8_lossy(&buf);
        let result = parser.process_line(&line, line_number);
        for meta in &result.metas {
            writer.write(meta)?;
            stats.commands_written += 1;
        }

        if let Some(error) = result.error {
            match policy {
                ParseErrorPolicy::Abort => return Err(error.into()),
                ParseErrorPolicy::Skip => {
                    tracing::warn!("Skipping line {}: {}", line_number, error);
                    stats.errors.push(error);
                }
            }
        }
    }

    stats.total_command_bytes = writer.total_command_bytes();
    stats.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(stats)
}
