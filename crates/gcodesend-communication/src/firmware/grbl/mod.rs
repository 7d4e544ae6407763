//! GRBL firmware support
//!
//! GRBL acknowledges every line with `ok` or `error:n` and has a 128 byte
//! serial receive buffer.

pub mod error_decoder;
pub mod response_parser;

use super::{ControllerType, FirmwareProtocol, Response};

/// Streaming capacity of a stock GRBL receive buffer
///
/// The ring buffer holds one byte less than its size.
pub const GRBL_BUFFER_CAPACITY: usize = 127;

/// GRBL line protocol
#[derive(Debug, Clone)]
pub struct GrblProtocol {
    capacity: usize,
}

impl GrblProtocol {
    /// Protocol for stock GRBL
    pub fn new() -> Self {
        Self::with_capacity(GRBL_BUFFER_CAPACITY)
    }

    /// Protocol for a build with a different receive buffer
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for GrblProtocol {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `line` is a stock GRBL startup banner
pub fn is_grbl_banner(line: &str) -> bool {
    line.starts_with("Grbl ")
}

impl FirmwareProtocol for GrblProtocol {
    fn controller_type(&self) -> ControllerType {
        ControllerType::Grbl
    }

    fn parse_response(&self, line: &str) -> Option<Response> {
        response_parser::parse_line(line, is_grbl_banner)
    }

    fn buffer_capacity(&self) -> usize {
        self.capacity
    }
}
