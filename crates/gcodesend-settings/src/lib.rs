//! # gcodesend settings
//!
//! Configuration for connections, streaming and file preprocessing, stored
//! as JSON or TOML in the platform configuration directory.

pub mod config;
pub mod error;

pub use config::{
    default_config_path, Config, ConnectionSettings, FileProcessingSettings, StreamingSettings,
};
pub use error::{ConfigError, ConfigResult};
