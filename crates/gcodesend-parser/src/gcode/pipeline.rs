//! G-Code processor pipeline and registry

use gcodesend_core::{Error, GcodeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use super::state::tokenize;
use super::{GcodeCommand, GcodeState};

/// Configuration options for command processors
///
/// Processor-specific settings are kept as string options so every
/// processor can be built from the same settings shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Whether this processor is enabled
    pub enabled: bool,
    /// Processor-specific options
    pub options: HashMap<String, String>,
}

impl ProcessorConfig {
    /// Create a new processor configuration
    pub fn new() -> Self {
        Self {
            enabled: true,
            options: HashMap::new(),
        }
    }

    /// Create a disabled processor configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Set a configuration option
    pub fn with_option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options.insert(key.into(), value.to_string());
        self
    }

    /// Get a configuration option
    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(|s| s.as_str())
    }

    /// Get an option parsed as `T`, ignoring values that fail to parse
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get_option(key).and_then(|v| v.parse().ok())
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for G-Code command processors
///
/// A processor consumes one command plus the modal state in effect before
/// it and emits zero or more commands. Processors may keep private state
/// across calls, so `process` takes `&mut self`.
pub trait CommandProcessor: Send {
    /// Get the name/identifier of this processor
    fn name(&self) -> &str;

    /// Get a description of what this processor does
    fn description(&self) -> &str;

    /// Process a single G-Code command
    ///
    /// Return an empty vector to drop the command. Malformed input yields a
    /// [`GcodeError`] carrying the offending text.
    fn process(
        &mut self,
        command: &GcodeCommand,
        state: &GcodeState,
    ) -> std::result::Result<Vec<GcodeCommand>, GcodeError>;

    /// Check if this processor is enabled
    fn is_enabled(&self) -> bool {
        true
    }

    /// Get the configuration for this processor
    fn config(&self) -> &ProcessorConfig {
        static DEFAULT_CONFIG: std::sync::OnceLock<ProcessorConfig> = std::sync::OnceLock::new();
        DEFAULT_CONFIG.get_or_init(ProcessorConfig::new)
    }
}

/// Ordered chain of command processors
///
/// Each stage's outputs become the next stage's inputs. Within a stage, a
/// scratch copy of the state is advanced over every emitted command, so a
/// later command sees the state its predecessor produced.
#[derive(Default)]
pub struct CommandProcessorList {
    processors: Vec<Box<dyn CommandProcessor>>,
}

impl CommandProcessorList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor; processors run in the order they were added
    pub fn push(&mut self, processor: Box<dyn CommandProcessor>) -> &mut Self {
        self.processors.push(processor);
        self
    }

    /// Builder form of [`CommandProcessorList::push`]
    pub fn with(mut self, processor: impl CommandProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Get the number of registered processors
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether the list has no processors
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// List all processors as (name, description, enabled)
    pub fn list_processors(&self) -> Vec<(&str, &str, bool)> {
        self.processors
            .iter()
            .map(|p| (p.name(), p.description(), p.is_enabled()))
            .collect()
    }

    /// Run one command through every enabled processor
    pub fn process(
        &mut self,
        command: &GcodeCommand,
        state: &GcodeState,
    ) -> std::result::Result<Vec<GcodeCommand>, GcodeError> {
        let line = command.line_number;
        let mut current = vec![command.clone()];

        for processor in self.processors.iter_mut() {
            if !processor.is_enabled() {
                continue;
            }

            let mut scratch = *state;
            let mut next = Vec::with_capacity(current.len());
            for cmd in &current {
                let outputs = processor.process(cmd, &scratch).map_err(|e| {
                    tracing::warn!(
                        "Processor '{}' failed on line {} '{}': {}",
                        processor.name(),
                        line,
                        cmd.command,
                        e
                    );
                    e.at_line(line)
                })?;
                for out in &outputs {
                    let words = tokenize(&out.command).map_err(|e| e.at_line(line))?;
                    scratch.apply(&words);
                }
                next.extend(outputs);
            }

            current = next;
            if current.is_empty() {
                break;
            }
        }

        Ok(current)
    }
}

impl std::fmt::Debug for CommandProcessorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|p| p.name()))
            .finish()
    }
}

type ProcessorFactory =
    Arc<dyn Fn(&ProcessorConfig) -> Result<Box<dyn CommandProcessor>> + Send + Sync>;

/// Named processor factories
///
/// An explicit value: build one at startup and pass it to whatever needs to
/// turn processor names from settings into a [`CommandProcessorList`].
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl ProcessorRegistry {
    /// Create an empty processor registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor factory
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ProcessorConfig) -> Result<Box<dyn CommandProcessor>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Create a processor by name
    pub fn create(&self, name: &str, config: &ProcessorConfig) -> Result<Box<dyn CommandProcessor>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::other(format!("Unknown processor: {}", name)))?;
        factory(config)
    }

    /// Build a list from (name, config) pairs, skipping disabled entries
    pub fn create_list<'a, I>(&self, specs: I) -> Result<CommandProcessorList>
    where
        I: IntoIterator<Item = (&'a str, &'a ProcessorConfig)>,
    {
        let mut list = CommandProcessorList::new();
        for (name, config) in specs {
            if !config.enabled {
                continue;
            }
            list.push(self.create(name, config)?);
        }
        Ok(list)
    }

    /// Whether a factory is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List all registered processor names, sorted
    pub fn list_registered(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.list_registered())
            .finish()
    }
}
