//! TinyG and g2core firmware support
//!
//! Both speak the JSON line protocol and only differ in receive buffer size.

pub mod response_parser;

use super::{ControllerType, FirmwareProtocol, Response};

/// Streaming capacity of the TinyG serial buffer
pub const TINYG_BUFFER_CAPACITY: usize = 64;

/// Streaming capacity of the g2core serial buffer
pub const G2CORE_BUFFER_CAPACITY: usize = 256;

/// TinyG / g2core JSON protocol
#[derive(Debug, Clone)]
pub struct TinyGProtocol {
    controller: ControllerType,
    capacity: usize,
}

impl TinyGProtocol {
    /// Protocol for TinyG
    pub fn tinyg() -> Self {
        Self {
            controller: ControllerType::TinyG,
            capacity: TINYG_BUFFER_CAPACITY,
        }
    }

    /// Protocol for g2core
    pub fn g2core() -> Self {
        Self {
            controller: ControllerType::G2Core,
            capacity: G2CORE_BUFFER_CAPACITY,
        }
    }
}

impl FirmwareProtocol for TinyGProtocol {
    fn controller_type(&self) -> ControllerType {
        self.controller
    }

    fn parse_response(&self, line: &str) -> Option<Response> {
        response_parser::parse_line(line)
    }

    fn buffer_capacity(&self) -> usize {
        self.capacity
    }
}
