//! Transport abstraction
//!
//! The communicator never touches a serial port or socket directly. It is
//! handed a [`Connection`] that writes bytes and delivers complete response
//! lines through a callback.

use gcodesend_core::Result;
use serde::{Deserialize, Serialize};

/// Callback receiving one response line, without its terminator
pub type LineHandler = Box<dyn FnMut(String) + Send>;

/// Connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port name or address (e.g. "/dev/ttyUSB0", "COM3", "192.168.1.20:23")
    pub port: String,
    /// Baud rate for serial links
    pub baud_rate: u32,
    /// Read/write timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            timeout_ms: 5_000,
        }
    }
}

impl ConnectionParams {
    /// Parameters for `port` at the default baud rate
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

/// A byte-oriented link to a controller
pub trait Connection: Send {
    /// Open the link; `on_line` is called for every complete line received
    fn open(&mut self, params: &ConnectionParams, on_line: LineHandler) -> Result<()>;

    /// Write bytes, returning how many were written
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Close the link
    fn close(&mut self) -> Result<()>;

    /// Whether the link is open
    fn is_open(&self) -> bool;
}
