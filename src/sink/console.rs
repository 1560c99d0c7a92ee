// SPDX-License-Identifier: Apache-2.0 OR MIT
// Console sink - writes records to stdout/stderr as text or JSON lines

use super::{LatencyTracker, Sink, SinkError, SinkSettings};
use crate::logging::{LogRecord, Severity};
use crate::sync;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Stream a console sink writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleTarget {
    #[default]
    Stdout,
    Stderr,
}

/// Line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// `<timestamp> [SEVERITY] [source/topic] text`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

pub struct ConsoleSink {
    settings: SinkSettings,
    format: ConsoleFormat,
    min_severity: Severity,
    out: Mutex<Box<dyn Write + Send>>,
    latency: LatencyTracker,
}

impl ConsoleSink {
    pub fn new(settings: SinkSettings, target: ConsoleTarget) -> Self {
        let out: Box<dyn Write + Send> = match target {
            ConsoleTarget::Stdout => Box::new(std::io::stdout()),
            ConsoleTarget::Stderr => Box::new(std::io::stderr()),
        };
        Self::with_writer(settings, out)
    }

    pub fn stdout(settings: SinkSettings) -> Self {
        Self::new(settings, ConsoleTarget::Stdout)
    }

    pub fn stderr(settings: SinkSettings) -> Self {
        Self::new(settings, ConsoleTarget::Stderr)
    }

    /// Write to an arbitrary stream instead of a console
    pub fn with_writer(settings: SinkSettings, out: Box<dyn Write + Send>) -> Self {
        Self {
            settings,
            format: ConsoleFormat::Text,
            min_severity: Severity::Debug,
            out: Mutex::new(out),
            latency: LatencyTracker::new(),
        }
    }

    pub fn with_format(mut self, format: ConsoleFormat) -> Self {
        self.format = format;
        self
    }

    /// Skip records below `severity` (they count as delivered)
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    fn write_record(&self, out: &mut dyn Write, record: &LogRecord) -> Result<(), SinkError> {
        match self.format {
            ConsoleFormat::Text => writeln!(out, "{}", record)?,
            ConsoleFormat::Json => {
                serde_json::to_writer(&mut *out, record)
                    .map_err(|e| SinkError::Rejected(e.to_string()))?;
                out.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn order(&self) -> i32 {
        self.settings.order
    }

    fn failover_target(&self) -> Option<&str> {
        self.settings.failover_target.as_deref()
    }

    fn emits_failover_notices(&self) -> bool {
        self.settings.emit_failover_notices
    }

    fn average_latency_ms(&self) -> f64 {
        self.latency.average_ms()
    }

    fn send(&self, record: &Arc<LogRecord>) -> Result<(), SinkError> {
        if !record.severity.is_at_least(self.min_severity) {
            return Ok(());
        }
        let started = Instant::now();
        let mut out = sync::lock(&self.out);
        self.write_record(out.as_mut(), record)?;
        self.latency.record(started.elapsed());
        Ok(())
    }

    fn pulse(&self) -> Result<(), SinkError> {
        sync::lock(&self.out).flush()?;
        Ok(())
    }

    fn wait_for_complete_stop(&self) -> Result<(), SinkError> {
        self.pulse()
    }
}
