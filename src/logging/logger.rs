// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logger handle for producers

use super::{LogRecord, Severity};
use crate::daemon::DaemonHandle;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Records at or above this severity are written urgent
pub const URGENT_THRESHOLD: Severity = Severity::Error;

/// Logger handle for writing records to a daemon
///
/// Bound to a source (and a topic, `general` unless set). Cheap to clone;
/// clones share the minimum severity filter, so adjusting it on one handle
/// affects every clone.
#[derive(Clone)]
pub struct Logger {
    daemon: DaemonHandle,
    source: Arc<str>,
    topic: Arc<str>,
    min_level: Arc<AtomicU8>,
}

impl Logger {
    pub fn new(daemon: DaemonHandle, source: impl Into<String>) -> Self {
        Self {
            daemon,
            source: Arc::from(source.into()),
            topic: Arc::from(super::record::DEFAULT_TOPIC),
            min_level: Arc::new(AtomicU8::new(Severity::Debug.as_u8())),
        }
    }

    /// Derive a logger for another topic sharing this one's filter
    pub fn with_topic(&self, topic: impl Into<String>) -> Self {
        Self {
            daemon: self.daemon.clone(),
            source: Arc::clone(&self.source),
            topic: Arc::from(topic.into()),
            min_level: Arc::clone(&self.min_level),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Set the minimum severity that gets written
    pub fn set_min_level(&self, level: Severity) {
        self.min_level.store(level.as_u8(), Ordering::Relaxed);
    }

    pub fn min_level(&self) -> Severity {
        Severity::from_u8(self.min_level.load(Ordering::Relaxed)).unwrap_or(Severity::Debug)
    }

    /// Check if a record of this severity would be written
    #[inline]
    pub fn enabled(&self, severity: Severity) -> bool {
        severity.as_u8() >= self.min_level.load(Ordering::Relaxed)
    }

    /// Create a record stamped with this logger's source and topic
    pub fn record(&self, severity: Severity, text: impl Into<String>) -> LogRecord {
        LogRecord::new(severity, &*self.source, text).with_topic(&*self.topic)
    }

    /// Write a prepared record, subject to the filter
    pub fn emit(&self, record: LogRecord) {
        if !self.enabled(record.severity) {
            return;
        }
        let urgent = record.severity.is_at_least(URGENT_THRESHOLD);
        self.daemon.write(record, urgent);
    }

    #[inline]
    pub fn log(&self, severity: Severity, text: &str) {
        if self.enabled(severity) {
            self.emit(self.record(severity, text));
        }
    }

    /// Write a record with a structured payload
    pub fn log_payload(&self, severity: Severity, text: &str, payload: serde_json::Value) {
        if self.enabled(severity) {
            self.emit(self.record(severity, text).with_payload(payload));
        }
    }

    /// Write a record carrying an error and its source chain
    pub fn log_error(&self, severity: Severity, text: &str, error: &(dyn std::error::Error + 'static)) {
        if self.enabled(severity) {
            self.emit(self.record(severity, text).with_error(error));
        }
    }

    #[inline]
    pub fn debug(&self, text: &str) {
        self.log(Severity::Debug, text);
    }

    #[inline]
    pub fn trace(&self, text: &str) {
        self.log(Severity::Trace, text);
    }

    #[inline]
    pub fn info(&self, text: &str) {
        self.log(Severity::Info, text);
    }

    #[inline]
    pub fn notice(&self, text: &str) {
        self.log(Severity::Notice, text);
    }

    #[inline]
    pub fn warning(&self, text: &str) {
        self.log(Severity::Warning, text);
    }

    #[inline]
    pub fn error(&self, text: &str) {
        self.log(Severity::Error, text);
    }

    #[inline]
    pub fn critical(&self, text: &str) {
        self.log(Severity::Critical, text);
    }

    #[inline]
    pub fn emergency(&self, text: &str) {
        self.log(Severity::Emergency, text);
    }

    #[inline]
    pub fn catastrophic(&self, text: &str) {
        self.log(Severity::Catastrophic, text);
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("source", &self.source)
            .field("topic", &self.topic)
            .field("min_level", &self.min_level())
            .finish()
    }
}
