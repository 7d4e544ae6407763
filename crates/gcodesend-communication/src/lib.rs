//! # gcodesend communication
//!
//! Streams commands to GRBL-family and TinyG-family controllers without
//! overrunning their receive buffers. The transport is supplied by the
//! caller through the [`Connection`] trait; the firmware dialect through a
//! [`FirmwareProtocol`] picked from a [`FirmwareRegistry`].

pub mod communication;
pub mod firmware;

pub use communication::{
    BufferedCommand, BufferedCommunicator, CommandSource, CommandState, CommunicatorConfig,
    CommunicatorListener, CommunicatorSnapshot, Connection, ConnectionParams, ErrorPolicy,
    LineHandler, MockConnection, SourceCommand, StreamSource, StreamingEngine, VecSource,
};

pub use firmware::{ControllerType, FirmwareProtocol, FirmwareRegistry, Response};
