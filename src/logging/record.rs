// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log record structure

use super::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic used when a producer does not name one
pub const DEFAULT_TOPIC: &str = "general";

/// One log event.
///
/// Records are built by producers and become read-only once handed to
/// [`crate::LogDaemon::write`]: the daemon shares them as `Arc<LogRecord>`
/// between the queue, every sink, and any failover path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unique record id (failover notices point back at it)
    pub id: Uuid,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    /// Component that produced the record
    pub source: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Rendered error chain attached by the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub process_id: u32,
}

impl LogRecord {
    /// Create a new record stamped with the current UTC time
    pub fn new(severity: Severity, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            timestamp: Utc::now(),
            topic: DEFAULT_TOPIC.to_string(),
            source: source.into(),
            text: text.into(),
            payload: None,
            exception: None,
            correlation_id: None,
            process_id: std::process::id(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Attach a structured payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach an error, rendering its full source chain
    pub fn with_error(mut self, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut rendered = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        self.exception = Some(rendered);
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] [{}/{}] {}",
            self.timestamp.to_rfc3339(),
            self.severity,
            self.source,
            self.topic,
            self.text
        )?;
        if let Some(exception) = &self.exception {
            write!(f, " ({})", exception)?;
        }
        Ok(())
    }
}
