//! # gcodesend
//!
//! Streams G-code programs to GRBL, grblHAL, FluidNC, TinyG and g2core
//! controllers without overrunning their receive buffers.
//!
//! ## Architecture
//!
//! gcodesend is organized as a workspace with multiple crates:
//!
//! 1. **gcodesend-core** - Errors, positions, controller status, listeners
//! 2. **gcodesend-parser** - Modal state, processor pipeline, stream files
//! 3. **gcodesend-communication** - Firmware protocols and the buffered communicator
//! 4. **gcodesend-settings** - JSON/TOML configuration
//! 5. **gcodesend** - CLI binary that integrates all crates
//!
//! A program is preprocessed once into a stream file, then streamed from
//! that file so it never has to fit in memory.

pub use gcodesend_communication::firmware;

pub use gcodesend_core::{
    CommunicatorState, ConnectionError, ControllerError, ControllerStatus, Error, GcodeError,
    ListenerRegistry, Position, ProtocolError, Result, StatusReport, StreamError, Subscription,
    Units,
};

pub use gcodesend_parser::{
    preprocess_file, CommandProcessor, CommandProcessorList, GcodeMeta, GcodeParser, GcodeState,
    GcodeStreamReader, GcodeStreamWriter, ParseErrorPolicy, PreprocessStats, ProcessorConfig,
    ProcessorRegistry,
};

pub use gcodesend_communication::{
    BufferedCommand, BufferedCommunicator, CommandSource, CommunicatorConfig,
    CommunicatorListener, Connection, ConnectionParams, ControllerType, ErrorPolicy,
    FirmwareProtocol, FirmwareRegistry, StreamSource, StreamingEngine,
};

pub use gcodesend_settings::{
    default_config_path, Config, ConfigError, ConnectionSettings, FileProcessingSettings,
    StreamingSettings,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with the default configuration
///
/// Logs go to stderr so command output on stdout stays clean. `RUST_LOG`
/// overrides the default `info` level.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
