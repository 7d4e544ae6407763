//! Persisted G-code streams
//!
//! A preprocessed program is written once and then read forward while it is
//! sent, so the whole program never has to sit in memory.
//!
//! File layout (little-endian):
//!
//! ```text
//! header:  magic [u8; 8] | format_version u16 | record_count u32 | total_command_bytes u64
//! records: body_len u32 | body (bincode)
//! ```
//!
//! The header is written as a placeholder when the stream is created and
//! rewritten with the final counts on [`GcodeStreamWriter::finish`]. A file
//! that was never finished reports zero records.
//!
//! `total_command_bytes` counts each trimmed command plus a one-byte
//! terminator. Use [`GcodeStreamReader::wire_bytes`] for other terminators.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use gcodesend_core::{Error, Position, Result, StreamError};
use serde::{Deserialize, Serialize};

use super::GcodeMeta;

/// Leading bytes of every stream file
pub const STREAM_MAGIC: [u8; 8] = *b"GCSTREAM";

/// Format version written by this build
pub const STREAM_FORMAT_VERSION: u16 = 1;

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 8 + 2 + 4 + 8;

/// Largest record body accepted, in bytes
pub const MAX_RECORD_LEN: usize = 1 << 20;

#[derive(Serialize)]
struct RecordRef<'a> {
    line_number: u32,
    original: &'a str,
    command: &'a str,
    start: &'a Position,
    end: &'a Position,
    feed_rate: f64,
    spindle_speed: f64,
    flags: u8,
}

#[derive(Deserialize)]
struct Record {
    line_number: u32,
    original: String,
    command: String,
    start: Position,
    end: Position,
    feed_rate: f64,
    spindle_speed: f64,
    flags: u8,
}

impl From<Record> for GcodeMeta {
    fn from(record: Record) -> Self {
        let mut meta = GcodeMeta {
            line_number: record.line_number,
            original: record.original,
            command: record.command,
            start: record.start,
            end: record.end,
            is_arc: false,
            is_z_movement: false,
            is_fast_traverse: false,
            is_rotation: false,
            is_motion: false,
            feed_rate: record.feed_rate,
            spindle_speed: record.spindle_speed,
        };
        meta.set_flags(record.flags);
        meta
    }
}

/// Stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Format version found in the file
    pub format_version: u16,
    /// Number of records
    pub record_count: u32,
    /// Bytes the commands occupy on the wire, one terminator each included
    pub total_command_bytes: u64,
}

impl StreamHeader {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[..8].copy_from_slice(&STREAM_MAGIC);
        bytes[8..10].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[10..14].copy_from_slice(&self.record_count.to_le_bytes());
        bytes[14..22].copy_from_slice(&self.total_command_bytes.to_le_bytes());
        bytes
    }

    fn decode(bytes: &[u8; HEADER_LEN]) -> std::result::Result<Self, StreamError> {
        if bytes[..8] != STREAM_MAGIC {
            return Err(StreamError::BadMagic);
        }
        let format_version = u16::from_le_bytes([bytes[8], bytes[9]]);
        if format_version != STREAM_FORMAT_VERSION {
            return Err(StreamError::VersionMismatch {
                expected: STREAM_FORMAT_VERSION,
                found: format_version,
            });
        }
        let mut count = [0u8; 4];
        count.copy_from_slice(&bytes[10..14]);
        let mut total = [0u8; 8];
        total.copy_from_slice(&bytes[14..22]);
        Ok(Self {
            format_version,
            record_count: u32::from_le_bytes(count),
            total_command_bytes: u64::from_le_bytes(total),
        })
    }
}

/// Appends records to a stream
///
/// Dropping an unfinished writer attempts to finish it; call
/// [`GcodeStreamWriter::finish`] to observe errors.
pub struct GcodeStreamWriter<W: Write + Seek = BufWriter<File>> {
    inner: Option<W>,
    record_count: u32,
    total_command_bytes: u64,
    scratch: Vec<u8>,
}

impl GcodeStreamWriter<BufWriter<File>> {
    /// Create (or truncate) a stream file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Seek> GcodeStreamWriter<W> {
    /// Start a stream on `inner`, writing a placeholder header
    pub fn new(mut inner: W) -> Result<Self> {
        let header = StreamHeader {
            format_version: STREAM_FORMAT_VERSION,
            record_count: 0,
            total_command_bytes: 0,
        };
        inner.write_all(&header.encode())?;
        Ok(Self {
            inner: Some(inner),
            record_count: 0,
            total_command_bytes: 0,
            scratch: Vec::with_capacity(256),
        })
    }

    /// Records written so far
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Command bytes written so far, one terminator byte per record included
    pub fn total_command_bytes(&self) -> u64 {
        self.total_command_bytes
    }

    /// Append one record
    pub fn write(&mut self, meta: &GcodeMeta) -> Result<()> {
        let inner = self.inner.as_mut().ok_or(StreamError::AlreadyFinished)?;
        if self.record_count == u32::MAX {
            return Err(StreamError::TooManyRecords {
                max: u32::MAX as u64,
            }
            .into());
        }

        let record = RecordRef {
            line_number: meta.line_number,
            original: &meta.original,
            command: &meta.command,
            start: &meta.start,
            end: &meta.end,
            feed_rate: meta.feed_rate,
            spindle_speed: meta.spindle_speed,
            flags: meta.flags(),
        };
        self.scratch.clear();
        bincode::serialize_into(&mut self.scratch, &record)
            .map_err(|e| Error::other(format!("Failed to encode stream record: {}", e)))?;
        if self.scratch.len() > MAX_RECORD_LEN {
            return Err(Error::other(format!(
                "Stream record for line {} is {} bytes, limit is {}",
                meta.line_number,
                self.scratch.len(),
                MAX_RECORD_LEN
            )));
        }
        let len = self.scratch.len() as u32;

        inner.write_all(&len.to_le_bytes())?;
        inner.write_all(&self.scratch)?;

        self.record_count += 1;
        self.total_command_bytes += meta.command.trim().len() as u64 + 1;
        Ok(())
    }

    /// Rewrite the header with the final counts and return the sink
    pub fn finish(mut self) -> Result<W> {
        self.finish_inner()?
            .ok_or_else(|| StreamError::AlreadyFinished.into())
    }

    fn finish_inner(&mut self) -> Result<Option<W>> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(None);
        };
        let header = StreamHeader {
            format_version: STREAM_FORMAT_VERSION,
            record_count: self.record_count,
            total_command_bytes: self.total_command_bytes,
        };
        inner.flush()?;
        let end = inner.stream_position()?;
        inner.seek(SeekFrom::Start(0))?;
        inner.write_all(&header.encode())?;
        inner.seek(SeekFrom::Start(end))?;
        inner.flush()?;
        tracing::debug!(
            "Finished stream: {} records, {} command bytes",
            self.record_count,
            self.total_command_bytes
        );
        Ok(Some(inner))
    }
}

impl<W: Write + Seek> Drop for GcodeStreamWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.finish_inner() {
                tracing::warn!("Failed to finish stream on drop: {}", e);
            }
        }
    }
}

/// Forward-only reader over a stream
pub struct GcodeStreamReader<R: Read = BufReader<File>> {
    inner: R,
    header: StreamHeader,
    position: u64,
    failed: bool,
    scratch: Vec<u8>,
}

impl GcodeStreamReader<BufReader<File>> {
    /// Open a stream file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> GcodeStreamReader<R> {
    /// Validate the header and position at the first record
    pub fn new(mut inner: R) -> Result<Self> {
        let mut bytes = [0u8; HEADER_LEN];
        inner.read_exact(&mut bytes).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::from(StreamError::BadMagic),
            _ => Error::from(e),
        })?;
        let header = StreamHeader::decode(&bytes)?;
        Ok(Self {
            inner,
            header,
            position: 0,
            failed: false,
            scratch: Vec::with_capacity(256),
        })
    }

    /// The validated header
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Number of records in the stream
    pub fn record_count(&self) -> u64 {
        self.header.record_count as u64
    }

    /// Command bytes in the stream, one terminator per record included
    pub fn total_bytes(&self) -> u64 {
        self.header.total_command_bytes
    }

    /// Bytes the commands occupy when each is followed by a
    /// `terminator_len` byte terminator
    pub fn wire_bytes(&self, terminator_len: usize) -> u64 {
        let records = self.record_count();
        self.total_bytes() - records + records * terminator_len as u64
    }

    /// Index of the next record
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Records not yet read or skipped
    pub fn remaining(&self) -> u64 {
        self.record_count().saturating_sub(self.position)
    }

    /// Read the next record, or `None` at the end
    pub fn next_record(&mut self) -> Result<Option<GcodeMeta>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        let len = self.read_len()?;
        self.scratch.resize(len, 0);
        let index = self.position;
        self.inner
            .read_exact(&mut self.scratch)
            .map_err(|e| corrupt(index, e.to_string()))?;
        let record: Record =
            bincode::deserialize(&self.scratch).map_err(|e| corrupt(index, e.to_string()))?;
        self.position += 1;
        Ok(Some(record.into()))
    }

    /// Move past up to `n` records without decoding them
    ///
    /// Returns the number of records skipped.
    pub fn skip_records(&mut self, n: u64) -> Result<u64> {
        let count = n.min(self.remaining());
        for _ in 0..count {
            let index = self.position;
            let len = self.read_len()? as u64;
            let copied = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
            if copied != len {
                return Err(corrupt(index, "truncated record".to_string()));
            }
            self.position += 1;
        }
        Ok(count)
    }

    fn read_len(&mut self) -> Result<usize> {
        let mut len = [0u8; 4];
        let index = self.position;
        self.inner
            .read_exact(&mut len)
            .map_err(|e| corrupt(index, e.to_string()))?;
        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_RECORD_LEN {
            return Err(corrupt(
                index,
                format!("length {} exceeds {} bytes", len, MAX_RECORD_LEN),
            ));
        }
        Ok(len)
    }
}

fn corrupt(index: u64, reason: String) -> Error {
    StreamError::CorruptRecord { index, reason }.into()
}

impl<R: Read> Iterator for GcodeStreamReader<R> {
    type Item = Result<GcodeMeta>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.next_record().transpose();
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let remaining = self.remaining() as usize;
        (0, Some(remaining))
    }
}
