//! grblHAL Firmware Support
//!
//! grblHAL is a high-performance fork of GRBL. It speaks the GRBL 1.1 line
//! protocol with a larger receive buffer and its own startup banner.

use super::grbl::response_parser;
use super::{ControllerType, FirmwareProtocol, Response};

/// Streaming capacity of the default grblHAL receive buffer
pub const GRBLHAL_BUFFER_CAPACITY: usize = 255;

/// grblHAL version information
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrblHalVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Build letter (e.g. `f` in `1.1f`)
    pub build: Option<char>,
}

impl GrblHalVersion {
    /// Parse the version out of a banner such as `GrblHAL 1.1f ['$' or '$HELP' for help]`
    pub fn from_banner(banner: &str) -> Option<Self> {
        let version = banner.strip_prefix("GrblHAL ")?.split_whitespace().next()?;
        let (major, rest) = version.split_once('.')?;
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        Some(Self {
            major: major.parse().ok()?,
            minor: digits.parse().ok()?,
            build: rest[digits.len()..].chars().next(),
        })
    }
}

impl std::fmt::Display for GrblHalVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(build) = self.build {
            write!(f, "{}.{}{}", self.major, self.minor, build)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

/// grblHAL line protocol
#[derive(Debug, Clone)]
pub struct GrblHalProtocol {
    capacity: usize,
}

impl GrblHalProtocol {
    /// Protocol with the default receive buffer
    pub fn new() -> Self {
        Self {
            capacity: GRBLHAL_BUFFER_CAPACITY,
        }
    }
}

impl Default for GrblHalProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareProtocol for GrblHalProtocol {
    fn controller_type(&self) -> ControllerType {
        ControllerType::GrblHal
    }

    fn parse_response(&self, line: &str) -> Option<Response> {
        response_parser::parse_line(line, |l| {
            if let Some(version) = GrblHalVersion::from_banner(l) {
                tracing::info!("grblHAL {} detected", version);
                true
            } else {
                l.starts_with("GrblHAL ")
            }
        })
    }

    fn buffer_capacity(&self) -> usize {
        self.capacity
    }
}
