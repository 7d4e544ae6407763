//! Error handling for gcodesend
//!
//! Provides error types for every layer of the sender:
//! - G-Code errors (tokenizing, preprocessing)
//! - Stream file errors (persisted preprocessed programs)
//! - Protocol errors (unexpected or malformed controller responses)
//! - Connection errors (transport failures)
//! - Controller errors (the machine rejected a command or raised an alarm)
//! - Capacity violations (a send would overrun the controller's receive buffer)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// G-Code error type
///
/// Raised while tokenizing or preprocessing a single line. These are
/// recoverable: they are reported per line and the caller decides whether
/// to continue with the next line or abort.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// Invalid G-Code syntax
    #[error("Invalid syntax at line {line_number}: {reason} in '{text}'")]
    InvalidSyntax {
        /// The line number where the syntax error occurred.
        line_number: u32,
        /// The offending text.
        text: String,
        /// The reason for the syntax error.
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter '{param}' at line {line_number}: {reason}")]
    InvalidParameter {
        /// The line number where the invalid parameter was found.
        line_number: u32,
        /// The offending text.
        text: String,
        /// The parameter name.
        param: String,
        /// The reason the parameter is invalid.
        reason: String,
    },

    /// Arc geometry cannot be resolved
    #[error("Invalid arc at line {line_number}: {reason} in '{text}'")]
    InvalidArc {
        /// The line number of the arc command.
        line_number: u32,
        /// The offending text.
        text: String,
        /// Why the arc could not be computed.
        reason: String,
    },

    /// Command exceeds the configured maximum length
    #[error("Command at line {line_number} is {length} characters, limit is {max_length}")]
    CommandTooLong {
        /// The line number of the command.
        line_number: u32,
        /// The offending text.
        text: String,
        /// Length of the command.
        length: usize,
        /// Configured maximum.
        max_length: usize,
    },
}

impl GcodeError {
    /// Build a syntax error for `text`. The line number is filled in later.
    pub fn syntax(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            line_number: 0,
            text: text.into(),
            reason: reason.into(),
        }
    }

    /// Build an arc error for `text`.
    pub fn arc(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArc {
            line_number: 0,
            text: text.into(),
            reason: reason.into(),
        }
    }

    /// Line number the error was reported for
    pub fn line_number(&self) -> u32 {
        match self {
            Self::InvalidSyntax { line_number, .. }
            | Self::InvalidParameter { line_number, .. }
            | Self::InvalidArc { line_number, .. }
            | Self::CommandTooLong { line_number, .. } => *line_number,
        }
    }

    /// The offending text
    pub fn text(&self) -> &str {
        match self {
            Self::InvalidSyntax { text, .. }
            | Self::InvalidParameter { text, .. }
            | Self::InvalidArc { text, .. }
            | Self::CommandTooLong { text, .. } => text,
        }
    }

    /// Attach a line number, replacing whatever was set before
    pub fn at_line(mut self, number: u32) -> Self {
        match &mut self {
            Self::InvalidSyntax { line_number, .. }
            | Self::InvalidParameter { line_number, .. }
            | Self::InvalidArc { line_number, .. }
            | Self::CommandTooLong { line_number, .. } => *line_number = number,
        }
        self
    }
}

/// Stream file error type
///
/// Raised by the persisted G-code stream reader and writer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The file does not start with the stream magic
    #[error("Not a G-code stream file")]
    BadMagic,

    /// The file was written by an incompatible format version
    #[error("Unsupported stream format version {found} (expected {expected})")]
    VersionMismatch {
        /// Version this build reads and writes.
        expected: u16,
        /// Version found in the header.
        found: u16,
    },

    /// A record could not be decoded
    #[error("Stream record {index} is corrupt: {reason}")]
    CorruptRecord {
        /// Zero-based record index.
        index: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// The header record count exceeds the format limit
    #[error("Stream holds more than {max} records")]
    TooManyRecords {
        /// The maximum number of records a header can describe.
        max: u64,
    },

    /// Writing after `finish`
    #[error("Stream writer is already finished")]
    AlreadyFinished,
}

/// Protocol error type
///
/// The controller said something the line protocol does not allow at this
/// point. Fatal to the streaming session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The controller did not identify itself correctly after connect
    #[error("Handshake failed: {reason}")]
    Handshake {
        /// What was received instead of a banner.
        reason: String,
    },

    /// No banner within the configured time
    #[error("Handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// An acknowledgement arrived while no command was in flight
    #[error("Unexpected response '{response}' with no command pending")]
    UnexpectedResponse {
        /// The raw response line.
        response: String,
    },

    /// A response line could not be decoded
    #[error("Malformed response '{response}': {reason}")]
    MalformedResponse {
        /// The raw response line.
        response: String,
        /// Why it could not be decoded.
        reason: String,
    },
}

/// Connection error type
///
/// Transport-level failures. These disconnect the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// No worker or transport is running
    #[error("Not connected")]
    NotConnected,

    /// Connect called on an open connection
    #[error("Already connected")]
    AlreadyConnected,

    /// Failed to open port
    #[error("Failed to open {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Writing to the transport failed or was short
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason for the failure.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Controller error type
///
/// The machine reported a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Command was rejected by the controller
    #[error("{}", describe_command_failure(*line_number, command, *code, message))]
    CommandFailed {
        /// Source line of the rejected command, if known.
        line_number: Option<u32>,
        /// The command text.
        command: String,
        /// Firmware error code.
        code: u32,
        /// Human-readable description of the code.
        message: String,
    },

    /// Alarm condition detected
    #[error("Alarm: {code} - {message}")]
    Alarm {
        /// The alarm code.
        code: u32,
        /// The alarm message.
        message: String,
    },

    /// Requested operation is not allowed in the current communicator state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// The requested operation.
        operation: String,
        /// The current state name.
        state: String,
    },
}

fn describe_command_failure(line: Option<u32>, command: &str, code: u32, message: &str) -> String {
    match line {
        Some(line) => format!("error:{} on line {} '{}': {}", code, line, command, message),
        None => format!("error:{} on '{}': {}", code, command, message),
    }
}

/// A send that would push the outstanding byte count past the controller's
/// receive buffer. Never expected in correct operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Command of {requested} bytes would overrun controller buffer ({outstanding}/{capacity} bytes in use)")]
pub struct CapacityViolation {
    /// Bytes the rejected command needs.
    pub requested: usize,
    /// Bytes sent but not yet acknowledged.
    pub outstanding: usize,
    /// Receive buffer capacity.
    pub capacity: usize,
}

/// Main error type for gcodesend
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs and the only error
/// type handed to communicator listeners.
#[derive(Error, Debug)]
pub enum Error {
    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Stream file error
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Buffer capacity violation
    #[error(transparent)]
    Capacity(#[from] CapacityViolation),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a parse error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Whether the error ends the streaming session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_)
                | Error::Connection(_)
                | Error::Io(_)
                | Error::Controller(ControllerError::Alarm { .. })
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
