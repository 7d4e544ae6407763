//! FluidNC Firmware Support
//!
//! FluidNC speaks the GRBL 1.1 line protocol. Its banner starts like GRBL's
//! and names FluidNC in brackets:
//! `Grbl 3.7 [FluidNC v3.7.8 (wifi) '$' for help]`.

use super::grbl::response_parser;
use super::{ControllerType, FirmwareProtocol, Response};

/// Streaming capacity of the FluidNC receive buffer
pub const FLUIDNC_BUFFER_CAPACITY: usize = 511;

/// FluidNC line protocol
#[derive(Debug, Clone, Default)]
pub struct FluidNcProtocol;

impl FluidNcProtocol {
    /// Create the protocol
    pub fn new() -> Self {
        Self
    }
}

/// Whether `line` is a FluidNC startup banner
pub fn is_fluidnc_banner(line: &str) -> bool {
    line.starts_with("Grbl ") && line.contains("FluidNC")
}

impl FirmwareProtocol for FluidNcProtocol {
    fn controller_type(&self) -> ControllerType {
        ControllerType::FluidNC
    }

    fn parse_response(&self, line: &str) -> Option<Response> {
        response_parser::parse_line(line, is_fluidnc_banner)
    }

    fn buffer_capacity(&self) -> usize {
        FLUIDNC_BUFFER_CAPACITY
    }
}
