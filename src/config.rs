// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Configuration file types and parsing for the log daemon.
//!
//! JSON5 configuration format supporting:
//! - Delivery timing (write interval, slice size, tick)
//! - Shutdown reliability and failover defaults
//! - Self-instrumentation
//! - Reference sinks built at construction
//! - Comments and trailing commas

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::sink::{ConsoleFormat, ConsoleSink, ConsoleTarget, MemorySink, Sink, SinkSettings};

pub const MIN_WRITE_INTERVAL_MS: u64 = 10;
pub const MAX_WRITE_INTERVAL_MS: u64 = 10_000;

/// Daemon configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Idle batching delay; clamped to [10, 10000] ms when used
    pub write_interval_ms: u64,

    /// Deliver everything still queued when stopping
    pub reliable: bool,

    /// Failover target for sinks that do not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_failover_name: Option<String>,

    pub instrumentation_enabled: bool,
    pub instrumentation_buffer_size: usize,
    pub instrumentation_interval_ms: u64,

    /// Allow `start` with an empty sink registry
    pub sinks_are_optional: bool,

    /// Records delivered per worker pass
    pub slice_size: usize,

    /// Upper bound on one idle wait, so stop is noticed promptly
    pub tick_ms: u64,

    pub max_nested_failures: usize,

    /// Sinks registered when the daemon is created
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sinks: Vec<SinkConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            write_interval_ms: 250,
            reliable: true,
            default_failover_name: None,
            instrumentation_enabled: false,
            instrumentation_buffer_size: 256,
            instrumentation_interval_ms: 4000,
            sinks_are_optional: false,
            slice_size: 10,
            tick_ms: 500,
            max_nested_failures: crate::sink::MAX_NESTED_FAILURES,
            sinks: Vec::new(),
        }
    }
}

/// Kind of reference sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Console,
    Memory,
}

/// Sink as stored in config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_target: Option<String>,
    #[serde(default)]
    pub emit_failover_notices: bool,

    /// Console only
    #[serde(default)]
    pub target: ConsoleTarget,
    /// Console only
    #[serde(default)]
    pub format: ConsoleFormat,
    /// Memory only
    #[serde(default = "default_memory_capacity")]
    pub capacity: usize,
}

fn default_memory_capacity() -> usize {
    1024
}

impl SinkConfig {
    pub fn settings(&self) -> SinkSettings {
        SinkSettings {
            name: self.name.clone(),
            order: self.order,
            failover_target: self.failover_target.clone(),
            emit_failover_notices: self.emit_failover_notices,
        }
    }

    /// Build the configured sink
    pub fn build(&self) -> Arc<dyn Sink> {
        match self.kind {
            SinkKind::Console => {
                Arc::new(ConsoleSink::new(self.settings(), self.target).with_format(self.format))
            }
            SinkKind::Memory => Arc::new(MemorySink::new(self.settings(), self.capacity)),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to JSON5 string (with pretty formatting)
    pub fn to_json5(&self) -> String {
        // json5 has no serializer with pretty printing; plain JSON is valid JSON5
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5();
        std::fs::write(path, content)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slice_size == 0 {
            return Err(invalid("slice_size", "must be greater than zero"));
        }
        if self.tick_ms == 0 {
            return Err(invalid("tick_ms", "must be greater than zero"));
        }
        if self.max_nested_failures == 0 {
            return Err(invalid("max_nested_failures", "must be greater than zero"));
        }
        if self.instrumentation_interval_ms == 0 {
            return Err(invalid(
                "instrumentation_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.instrumentation_enabled && self.instrumentation_buffer_size == 0 {
            return Err(invalid(
                "instrumentation_buffer_size",
                "must be greater than zero when instrumentation is enabled",
            ));
        }
        if let Some(name) = &self.default_failover_name {
            if name.trim().is_empty() {
                return Err(invalid("default_failover_name", "must not be empty"));
            }
        }

        let mut seen = HashSet::new();
        for (idx, sink) in self.sinks.iter().enumerate() {
            if sink.name.trim().is_empty() {
                return Err(ConfigError::InvalidSink {
                    index: idx,
                    reason: "name must not be empty".to_string(),
                });
            }
            if !seen.insert(sink.name.as_str()) {
                return Err(ConfigError::DuplicateSink(sink.name.clone()));
            }
            if sink.kind == SinkKind::Memory && sink.capacity == 0 {
                return Err(ConfigError::InvalidSink {
                    index: idx,
                    reason: "memory sink capacity must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Write interval clamped to the supported range
    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(
            self.write_interval_ms
                .clamp(MIN_WRITE_INTERVAL_MS, MAX_WRITE_INTERVAL_MS),
        )
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn instrumentation_interval(&self) -> Duration {
        Duration::from_millis(self.instrumentation_interval_ms.max(1))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(std::path::PathBuf, String),
    ParseError(String),
    InvalidValue { field: &'static str, reason: String },
    DuplicateSink(String),
    InvalidSink { index: usize, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, msg) => {
                write!(
                    f,
                    "failed to read config file '{}': {}",
                    path.display(),
                    msg
                )
            }
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
            ConfigError::DuplicateSink(name) => {
                write!(f, "sink '{}' is configured more than once", name)
            }
            ConfigError::InvalidSink { index, reason } => {
                write!(f, "invalid sink at index {}: {}", index, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
