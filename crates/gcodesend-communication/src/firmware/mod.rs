//! Firmware protocol variants
//!
//! Supported controllers:
//! - GRBL: Open-source CNC control software
//! - grblHAL: GRBL fork with a larger receive buffer
//! - FluidNC: GRBL-compatible firmware for ESP32 boards
//! - TinyG / g2core: JSON protocol controllers
//!
//! Each variant is a [`FirmwareProtocol`] value picked at connect time from a
//! [`FirmwareRegistry`].

pub mod fluidnc;
pub mod grbl;
pub mod grblhal;
pub mod tinyg;

use std::collections::HashMap;
use std::sync::Arc;

use gcodesend_core::{Error, Result, StatusReport};

pub use fluidnc::FluidNcProtocol;
pub use grbl::GrblProtocol;
pub use grblhal::GrblHalProtocol;
pub use tinyg::TinyGProtocol;

/// Supported CNC controller types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControllerType {
    /// GRBL (default, most common)
    #[default]
    Grbl,
    /// grblHAL (enhanced GRBL with additional features)
    GrblHal,
    /// FluidNC
    FluidNC,
    /// TinyG
    TinyG,
    /// g2core (TinyG variant)
    G2Core,
}

impl ControllerType {
    /// Registry name of the controller
    pub fn name(&self) -> &'static str {
        match self {
            Self::Grbl => "grbl",
            Self::GrblHal => "grblhal",
            Self::FluidNC => "fluidnc",
            Self::TinyG => "tinyg",
            Self::G2Core => "g2core",
        }
    }
}

impl std::fmt::Display for ControllerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grbl => write!(f, "GRBL"),
            Self::GrblHal => write!(f, "grblHAL"),
            Self::FluidNC => write!(f, "FluidNC"),
            Self::TinyG => write!(f, "TinyG"),
            Self::G2Core => write!(f, "g2core"),
        }
    }
}

/// One classified controller response line
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The oldest in-flight command was accepted
    Ack,
    /// The oldest in-flight command was rejected
    Error {
        /// Firmware error code
        code: u32,
        /// Human-readable description
        message: String,
    },
    /// The controller entered an alarm state
    Alarm {
        /// Firmware alarm code
        code: u32,
        /// Human-readable description
        message: String,
    },
    /// Out-of-band status report
    Status(StatusReport),
    /// Startup banner; the controller has (re)initialised
    Banner(String),
    /// Anything else: feedback messages, settings, echoes
    Message(String),
}

impl Response {
    /// Whether the response completes an in-flight command
    pub fn completes_command(&self) -> bool {
        matches!(self, Self::Ack | Self::Error { .. })
    }
}

/// Wire protocol of one firmware family
pub trait FirmwareProtocol: Send + Sync {
    /// Which controller this protocol speaks to
    fn controller_type(&self) -> ControllerType;

    /// Text to send for `command`, without terminator
    fn build_command(&self, command: &str) -> String {
        command.trim().to_string()
    }

    /// Classify one response line; `None` for blank lines
    fn parse_response(&self, line: &str) -> Option<Response>;

    /// Receive buffer size in bytes available for streaming
    fn buffer_capacity(&self) -> usize;

    /// Realtime bytes that reset the controller
    fn soft_reset(&self) -> Option<&'static [u8]> {
        Some(&[0x18])
    }

    /// Realtime bytes that request a status report
    fn status_query(&self) -> Option<&'static [u8]> {
        Some(b"?")
    }
}

type FirmwareFactory = Arc<dyn Fn() -> Box<dyn FirmwareProtocol> + Send + Sync>;

/// Named firmware protocols
///
/// An explicit value passed to whoever needs to pick a protocol. Names are
/// matched case-insensitively.
#[derive(Clone, Default)]
pub struct FirmwareRegistry {
    factories: HashMap<String, FirmwareFactory>,
}

impl FirmwareRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in protocol
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("grbl", || Box::new(GrblProtocol::new()))
            .register("grblhal", || Box::new(GrblHalProtocol::new()))
            .register("fluidnc", || Box::new(FluidNcProtocol::new()))
            .register("tinyg", || Box::new(TinyGProtocol::tinyg()))
            .register("g2core", || Box::new(TinyGProtocol::g2core()));
        registry
    }

    /// Register a protocol factory under `name`
    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn FirmwareProtocol> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    /// Build the protocol registered under `name`
    pub fn create(&self, name: &str) -> Result<Box<dyn FirmwareProtocol>> {
        self.factories
            .get(&name.to_ascii_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| Error::other(format!("Unknown firmware: {}", name)))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FirmwareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareRegistry")
            .field("names", &self.names())
            .finish()
    }
}
