// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Failover routing for sink delivery failures.
//!
//! Every delivery goes through [`FailoverCoordinator::deliver`], which turns
//! the sink's `Result` into an explicit [`FailoverCoordinator::notify`] call:
//!
//! - `Ok` after a failure: recovery, latched faults for the sink are cleared
//! - `Err` without a record (pulse): the fault is latched, nothing is rerouted
//! - `Err` with a record: the record is forwarded to the failover target
//!
//! Forwarding recurses through `deliver`, so a failing target fails over in
//! turn. Only direct self-reference is rejected by name; longer cycles such
//! as A -> B -> A are cut off by the nested failure cap.
//!
//! A sink that panics instead of returning `Err` breaks its contract. Outside
//! of a failover the panic is left to unwind; inside one it is caught and
//! latched as the failover error.

use super::registry::{SinkEntry, SinkRegistry};
use super::SinkError;
use crate::logging::{LogRecord, Severity};
use crate::sync;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default cap on chained failover hops for one failing delivery
pub const MAX_NESTED_FAILURES: usize = 8;

/// Source and topic stamped on synthesized failover notices
pub const NOTICE_SOURCE: &str = "logdaemon";
pub const FAILOVER_TOPIC: &str = "failover";

/// Failure raised while forwarding a record to a failover target
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverFault {
    /// Sink whose failure started the failover
    pub failing_sink: String,
    /// Sink that failed while receiving the forwarded record
    pub sink: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Latest failure reported by a sink, cleared when it recovers
#[derive(Debug, Clone, PartialEq)]
pub struct SinkFault {
    pub sink: String,
    pub error: String,
    /// Record being delivered, `None` for pulse failures
    pub record_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

/// Failover counters since the daemon was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailoverStats {
    pub redirected: u64,
    pub notices: u64,
    pub dropped_unresolved: u64,
    pub dropped_self_reference: u64,
    pub dropped_cascade: u64,
}

/// Routes failed deliveries to fallback sinks
pub struct FailoverCoordinator {
    registry: Arc<SinkRegistry>,
    default_target: Option<String>,
    max_nested_failures: usize,
    depth: AtomicUsize,
    failover_fault: Mutex<Option<FailoverFault>>,
    sink_faults: Mutex<HashMap<String, SinkFault>>,
    redirected: AtomicU64,
    notices: AtomicU64,
    dropped_unresolved: AtomicU64,
    dropped_self_reference: AtomicU64,
    dropped_cascade: AtomicU64,
}

/// Holds one level of failover nesting, released on drop
struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize, max: usize) -> Option<Self> {
        let previous = depth.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            depth.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(Self(depth))
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FailoverCoordinator {
    pub fn new(
        registry: Arc<SinkRegistry>,
        default_target: Option<String>,
        max_nested_failures: usize,
    ) -> Self {
        Self {
            registry,
            default_target,
            max_nested_failures,
            depth: AtomicUsize::new(0),
            failover_fault: Mutex::new(None),
            sink_faults: Mutex::new(HashMap::new()),
            redirected: AtomicU64::new(0),
            notices: AtomicU64::new(0),
            dropped_unresolved: AtomicU64::new(0),
            dropped_self_reference: AtomicU64::new(0),
            dropped_cascade: AtomicU64::new(0),
        }
    }

    /// Send a record to one sink, handling its failure
    pub fn deliver(&self, entry: &SinkEntry, record: &Arc<LogRecord>) -> Result<(), SinkError> {
        let result = entry.sink().send(record);
        self.settle(entry, result.as_ref().err(), Some(record));
        result
    }

    /// Pulse one sink, handling its failure
    pub fn pulse(&self, entry: &SinkEntry) -> Result<(), SinkError> {
        let result = entry.sink().pulse();
        self.settle(entry, result.as_ref().err(), None);
        result
    }

    fn settle(&self, entry: &SinkEntry, error: Option<&SinkError>, record: Option<&Arc<LogRecord>>) {
        match error {
            None => {
                if entry.mark_healthy() {
                    info!(sink = %entry.name(), "sink recovered");
                    self.notify(entry, None, record);
                }
            }
            Some(error) => {
                if entry.mark_faulted() {
                    warn!(sink = %entry.name(), error = %error, "sink failing");
                }
                self.notify(entry, Some(error), record);
            }
        }
    }

    /// Handle a failure (or recovery, when `error` is `None`) reported by `failing`
    pub fn notify(
        &self,
        failing: &SinkEntry,
        error: Option<&SinkError>,
        record: Option<&Arc<LogRecord>>,
    ) {
        let Some(error) = error else {
            self.clear_faults(failing.name());
            return;
        };

        self.latch_sink_fault(failing.name(), error, record.map(|r| r.id));

        let Some(record) = record else {
            return;
        };

        let target_name = match failing
            .sink()
            .failover_target()
            .or(self.default_target.as_deref())
        {
            Some(name) => name,
            None => {
                self.dropped_unresolved.fetch_add(1, Ordering::Relaxed);
                debug!(sink = %failing.name(), record = %record.id, "no failover target, record dropped");
                return;
            }
        };

        if target_name == failing.name() {
            self.dropped_self_reference.fetch_add(1, Ordering::Relaxed);
            debug!(sink = %failing.name(), record = %record.id, "sink fails over to itself, record dropped");
            return;
        }

        let Some(target) = self.registry.entry(target_name) else {
            self.dropped_unresolved.fetch_add(1, Ordering::Relaxed);
            debug!(sink = %failing.name(), target = %target_name, "failover target not registered, record dropped");
            return;
        };

        let Some(_guard) = DepthGuard::enter(&self.depth, self.max_nested_failures) else {
            self.dropped_cascade.fetch_add(1, Ordering::Relaxed);
            debug!(sink = %failing.name(), record = %record.id, "failover cascade cap reached, record dropped");
            return;
        };

        self.redirected.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = contain(|| self.forward(failing, &target, record, error)) {
            warn!(sink = %failing.name(), target = %target.name(), error = %err, "failover delivery failed");
            *sync::lock(&self.failover_fault) = Some(FailoverFault {
                failing_sink: failing.name().to_string(),
                sink: target.name().to_string(),
                error: err.to_string(),
                at: Utc::now(),
            });
        }
    }

    fn forward(
        &self,
        failing: &SinkEntry,
        target: &SinkEntry,
        record: &Arc<LogRecord>,
        error: &SinkError,
    ) -> Result<(), SinkError> {
        self.deliver(target, record)?;

        if failing.sink().emits_failover_notices() || target.sink().emits_failover_notices() {
            let notice = Arc::new(failover_notice(record, failing, target, error));
            self.notices.fetch_add(1, Ordering::Relaxed);
            self.deliver(target, &notice)?;
        }

        self.pulse(target)
    }

    fn latch_sink_fault(&self, sink: &str, error: &SinkError, record_id: Option<Uuid>) {
        sync::lock(&self.sink_faults).insert(
            sink.to_string(),
            SinkFault {
                sink: sink.to_string(),
                error: error.to_string(),
                record_id,
                at: Utc::now(),
            },
        );
    }

    fn clear_faults(&self, sink: &str) {
        sync::lock(&self.sink_faults).remove(sink);
        let mut fault = sync::lock(&self.failover_fault);
        if fault.as_ref().is_some_and(|f| f.sink == sink) {
            *fault = None;
        }
    }

    /// Latest failure raised while forwarding to a failover target
    pub fn failover_error(&self) -> Option<FailoverFault> {
        sync::lock(&self.failover_fault).clone()
    }

    /// Latched per-sink faults, sorted by sink name
    pub fn sink_faults(&self) -> Vec<SinkFault> {
        let mut faults: Vec<SinkFault> = sync::lock(&self.sink_faults).values().cloned().collect();
        faults.sort_by(|a, b| a.sink.cmp(&b.sink));
        faults
    }

    /// Current failover nesting depth (zero outside of a failover)
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FailoverStats {
        FailoverStats {
            redirected: self.redirected.load(Ordering::Relaxed),
            notices: self.notices.load(Ordering::Relaxed),
            dropped_unresolved: self.dropped_unresolved.load(Ordering::Relaxed),
            dropped_self_reference: self.dropped_self_reference.load(Ordering::Relaxed),
            dropped_cascade: self.dropped_cascade.load(Ordering::Relaxed),
        }
    }
}

/// Build the diagnostic record sent alongside a redirected record
fn failover_notice(
    record: &LogRecord,
    failing: &SinkEntry,
    target: &SinkEntry,
    error: &SinkError,
) -> LogRecord {
    let latency = failing.sink().average_latency_ms();
    LogRecord::new(
        Severity::Warning,
        NOTICE_SOURCE,
        format!(
            "sink '{}' failed ({}), record {} redirected to '{}'",
            failing.name(),
            error,
            record.id,
            target.name()
        ),
    )
    .with_topic(FAILOVER_TOPIC)
    .with_correlation_id(record.id)
    .with_exception(error.to_string())
    .with_payload(json!({
        "original_record_id": record.id,
        "failing_sink": failing.name(),
        "target_sink": target.name(),
        "failing_sink_avg_latency_ms": latency,
        "error": error.to_string(),
    }))
}

/// Run a sink call, converting a panic into an error
pub(crate) fn contain<F>(call: F) -> Result<(), SinkError>
where
    F: FnOnce() -> Result<(), SinkError>,
{
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(SinkError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
