//! Configuration and settings management for gcodesend
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, timeout)
//! - Streaming settings (firmware, flow control, error handling)
//! - File processing defaults (processor pipeline, arc settings)
//!
//! Files are JSON or TOML, chosen by extension, and live in the platform
//! configuration directory by default.

use std::path::{Path, PathBuf};

use gcodesend_communication::{
    CommunicatorConfig, ConnectionParams, ErrorPolicy, FirmwareProtocol, FirmwareRegistry,
};
use gcodesend_parser::gcode::arc::DEFAULT_MAX_CHORD_ERROR;
use gcodesend_parser::gcode::rotation::DEFAULT_MAX_ROTATION_STEP;
use gcodesend_parser::gcode::DEFAULT_MAX_COMMAND_LENGTH;
use gcodesend_parser::{CommandProcessorList, ParseErrorPolicy, ProcessorConfig, ProcessorRegistry};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Directory name under the platform configuration directory
const APP_DIR: &str = "gcodesend";

/// Default configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Path of the default configuration file
///
/// `<config dir>/gcodesend/config.toml`, e.g. `~/.config/gcodesend/config.toml`
/// on Linux.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Port name or address
    pub port: String,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let params = ConnectionParams::default();
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: params.baud_rate,
            timeout_ms: params.timeout_ms,
        }
    }
}

/// Streaming settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Firmware name: grbl, grblhal, fluidnc, tinyg or g2core
    pub firmware: String,
    /// Override of the firmware's receive buffer size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_capacity: Option<usize>,
    /// Reaction to `error:` responses
    pub error_policy: ErrorPolicy,
    /// Send a soft reset when a stream is cancelled
    pub soft_reset_on_cancel: bool,
    /// Status poll period in milliseconds, 0 to disable
    pub status_poll_interval_ms: u64,
    /// Time allowed for the controller banner, 0 to skip the handshake
    pub handshake_timeout_ms: u64,
    /// Terminator appended to each command
    pub line_terminator: String,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        let communicator = CommunicatorConfig::default();
        Self {
            firmware: "grbl".to_string(),
            buffer_capacity: communicator.buffer_capacity,
            error_policy: communicator.error_policy,
            soft_reset_on_cancel: communicator.soft_reset_on_cancel,
            status_poll_interval_ms: communicator.status_poll_interval_ms,
            handshake_timeout_ms: communicator.handshake_timeout_ms,
            line_terminator: communicator.line_terminator,
        }
    }
}

/// File processing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileProcessingSettings {
    /// Processors to run, in order
    pub enabled_processors: Vec<String>,
    /// Strip comments even when `comment` is not listed
    pub remove_comments: bool,
    /// Maximum chord error of expanded arcs in mm
    pub arc_max_chord_error: f64,
    /// Largest rotary step of expanded rotations in degrees
    pub rotation_max_step: f64,
    /// Longest command the controller accepts, in characters
    pub max_line_length: usize,
    /// Decimals kept by the `decimal` processor
    pub decimal_precision: usize,
    /// What to do with malformed lines
    pub parse_error_policy: ParseErrorPolicy,
}

impl Default for FileProcessingSettings {
    fn default() -> Self {
        Self {
            enabled_processors: ["comment", "whitespace", "empty_line_remover", "arc_expander", "command_length"]
                .into_iter()
                .map(String::from)
                .collect(),
            remove_comments: true,
            arc_max_chord_error: DEFAULT_MAX_CHORD_ERROR,
            rotation_max_step: DEFAULT_MAX_ROTATION_STEP,
            max_line_length: DEFAULT_MAX_COMMAND_LENGTH,
            decimal_precision: 4,
            parse_error_policy: ParseErrorPolicy::default(),
        }
    }
}

impl FileProcessingSettings {
    /// Processor names in pipeline order with their options
    fn processor_specs(&self, run_from: Option<u32>) -> Vec<(String, ProcessorConfig)> {
        let mut names: Vec<&str> = self.enabled_processors.iter().map(String::as_str).collect();
        if self.remove_comments && !names.contains(&"comment") {
            names.insert(0, "comment");
        } else if !self.remove_comments {
            names.retain(|name| *name != "comment");
        }

        let mut specs = Vec::with_capacity(names.len() + 1);
        if let Some(line) = run_from {
            specs.push((
                "run_from".to_string(),
                ProcessorConfig::new().with_option("start_line", line),
            ));
        }
        for name in names {
            let config = match name {
                "arc_expander" => {
                    ProcessorConfig::new().with_option("max_chord_error", self.arc_max_chord_error)
                }
                "rotation_expander" => {
                    ProcessorConfig::new().with_option("max_step", self.rotation_max_step)
                }
                "command_length" => {
                    ProcessorConfig::new().with_option("max_length", self.max_line_length)
                }
                "decimal" => ProcessorConfig::new().with_option("precision", self.decimal_precision),
                _ => ProcessorConfig::new(),
            };
            specs.push((name.to_string(), config));
        }
        specs
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
    /// File processing settings
    pub file_processing: FileProcessingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = match extension(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the default config file, falling back to defaults when absent
    pub fn load_or_default() -> ConfigResult<Self> {
        let path = default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;
        let content = self.to_string_as(extension(path)?)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Serialize as `json` or `toml`
    pub fn to_string_in(&self, format: &str) -> ConfigResult<String> {
        let format = match format.to_ascii_lowercase().as_str() {
            "json" => Format::Json,
            "toml" => Format::Toml,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        self.to_string_as(format)
    }

    fn to_string_as(&self, format: Format) -> ConfigResult<String> {
        Ok(match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(ConfigError::out_of_range("connection.baud_rate", 0));
        }
        if self.connection.timeout_ms == 0 {
            return Err(ConfigError::out_of_range("connection.timeout_ms", 0));
        }

        let streaming = &self.streaming;
        if streaming.firmware.trim().is_empty() {
            return Err(ConfigError::out_of_range("streaming.firmware", "\"\""));
        }
        if let Some(capacity) = streaming.buffer_capacity {
            if capacity < 2 {
                return Err(ConfigError::out_of_range("streaming.buffer_capacity", capacity));
            }
        }
        if streaming.line_terminator.is_empty() {
            return Err(ConfigError::out_of_range("streaming.line_terminator", "\"\""));
        }

        let files = &self.file_processing;
        if !(files.arc_max_chord_error > 0.0 && files.arc_max_chord_error.is_finite()) {
            return Err(ConfigError::out_of_range(
                "file_processing.arc_max_chord_error",
                files.arc_max_chord_error,
            ));
        }
        if !(files.rotation_max_step > 0.0 && files.rotation_max_step.is_finite()) {
            return Err(ConfigError::out_of_range(
                "file_processing.rotation_max_step",
                files.rotation_max_step,
            ));
        }
        if files.max_line_length == 0 {
            return Err(ConfigError::out_of_range("file_processing.max_line_length", 0));
        }
        if files.decimal_precision > 10 {
            return Err(ConfigError::out_of_range(
                "file_processing.decimal_precision",
                files.decimal_precision,
            ));
        }

        Ok(())
    }

    /// Connection parameters for the configured port
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            port: self.connection.port.clone(),
            baud_rate: self.connection.baud_rate,
            timeout_ms: self.connection.timeout_ms,
        }
    }

    /// Communicator settings
    pub fn communicator_config(&self) -> CommunicatorConfig {
        let streaming = &self.streaming;
        CommunicatorConfig {
            buffer_capacity: streaming.buffer_capacity,
            error_policy: streaming.error_policy,
            soft_reset_on_cancel: streaming.soft_reset_on_cancel,
            status_poll_interval_ms: streaming.status_poll_interval_ms,
            handshake_timeout_ms: streaming.handshake_timeout_ms,
            line_terminator: streaming.line_terminator.clone(),
        }
    }

    /// Protocol of the configured firmware
    pub fn firmware_protocol(
        &self,
        registry: &FirmwareRegistry,
    ) -> ConfigResult<Box<dyn FirmwareProtocol>> {
        let name = self.streaming.firmware.trim();
        if !registry.contains(name) {
            return Err(ConfigError::UnknownFirmware(name.to_string()));
        }
        Ok(registry.create(name)?)
    }

    /// Build the preprocessing pipeline, optionally resuming at `run_from`
    pub fn processor_list(
        &self,
        registry: &ProcessorRegistry,
        run_from: Option<u32>,
    ) -> ConfigResult<CommandProcessorList> {
        let specs = self.file_processing.processor_specs(run_from);
        let list = registry.create_list(specs.iter().map(|(name, config)| (name.as_str(), config)))?;
        let names: Vec<&str> = list.list_processors().iter().map(|p| p.0).collect();
        tracing::debug!("Processor pipeline: {}", names.join(", "));
        Ok(list)
    }
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Json,
    Toml,
}

fn extension(path: &Path) -> ConfigResult<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Format::Json),
        Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or_default().to_string(),
        )),
    }
}
