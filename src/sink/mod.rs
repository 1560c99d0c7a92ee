// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Sink contract and reference sinks.
//!
//! A sink is a named, ordered destination for records. The daemon only ever
//! talks to sinks through the [`Sink`] trait; delivery failures come back as
//! `Err(SinkError)` and are routed by the [`FailoverCoordinator`].

mod console;
pub(crate) mod failover;
mod memory;
pub(crate) mod registry;

use crate::logging::LogRecord;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use console::{ConsoleFormat, ConsoleSink, ConsoleTarget};
pub use failover::{
    FailoverCoordinator, FailoverFault, FailoverStats, SinkFault, FAILOVER_TOPIC,
    MAX_NESTED_FAILURES, NOTICE_SOURCE,
};
pub use memory::MemorySink;
pub use registry::{DuplicateSink, SinkEntry, SinkRegistry};

/// Errors a sink reports back to the daemon
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("record rejected: {0}")]
    Rejected(String),

    #[error("sink panicked: {0}")]
    Panicked(String),
}

/// Delivery destination for log records.
///
/// Every method takes `&self`: the registry hands out shared snapshots, so
/// sinks keep their mutable state behind their own locks. `send` and `pulse`
/// are only ever called from the daemon worker, one call at a time, including
/// failover forwards. A sink that fails on a thread of its own reports it
/// through [`DaemonHandle::notify`](crate::DaemonHandle::notify) and the
/// worker does the rerouting.
///
/// Failures must come back as `Err`. A sink that panics in `send` or `pulse`
/// takes the worker down with it; `stop` then reports
/// [`DaemonError::WorkerPanicked`](crate::DaemonError::WorkerPanicked).
pub trait Sink: Send + Sync {
    /// Unique name within a daemon
    fn name(&self) -> &str;

    /// Delivery priority (ascending)
    fn order(&self) -> i32 {
        0
    }

    /// Sink that receives this sink's records when delivery fails
    fn failover_target(&self) -> Option<&str> {
        None
    }

    /// Request a synthesized notice whenever a failover involves this sink
    fn emits_failover_notices(&self) -> bool {
        false
    }

    /// Running average delivery latency, reported in failover notices
    fn average_latency_ms(&self) -> f64 {
        0.0
    }

    fn start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Deliver one record
    fn send(&self, record: &Arc<LogRecord>) -> Result<(), SinkError>;

    /// Flush hint
    fn pulse(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Release resources; called once, in reverse registration order
    fn wait_for_complete_stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Settings shared by the reference sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkSettings {
    pub name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_target: Option<String>,
    #[serde(default)]
    pub emit_failover_notices: bool,
}

impl SinkSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: 0,
            failover_target: None,
            emit_failover_notices: false,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_failover(mut self, target: impl Into<String>) -> Self {
        self.failover_target = Some(target.into());
        self
    }

    pub fn with_failover_notices(mut self, enabled: bool) -> Self {
        self.emit_failover_notices = enabled;
        self
    }
}

/// Lock-free running average of delivery latency.
///
/// Exponentially weighted (alpha = 1/8) over microseconds, so a sink can
/// update it from `send` without contending with readers.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    average_micros: AtomicU64,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        let sample = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let _ = self
            .average_micros
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |avg| {
                if avg == 0 {
                    Some(sample)
                } else {
                    Some(avg - avg / 8 + sample / 8)
                }
            });
    }

    pub fn average_ms(&self) -> f64 {
        self.average_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }
}
