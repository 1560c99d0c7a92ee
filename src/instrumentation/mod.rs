// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Self-instrumentation for the daemon.
//!
//! Producers copy every accepted record into a bounded ring and bump a
//! per-severity counter. The worker periodically samples the counters
//! (resetting them), publishes them through the `metrics` facade together
//! with the queue depth, and keeps the last sample for inspection.

mod ringbuffer;

pub use ringbuffer::RecordRing;

use crate::logging::{LogRecord, Severity};
use crate::sync;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Per-severity counts, indexed by [`Severity::index`]
pub type SeverityCounts = [u64; Severity::COUNT];

/// Counters captured on one sampling tick
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentationSample {
    pub taken_at: DateTime<Utc>,
    pub counts: SeverityCounts,
    pub queue_depth: usize,
}

impl InstrumentationSample {
    pub fn count(&self, severity: Severity) -> u64 {
        self.counts[severity.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Point-in-time copy of the instrumentation state
#[derive(Debug, Clone)]
pub struct InstrumentationSnapshot {
    /// Recent records, oldest first
    pub records: Vec<Arc<LogRecord>>,
    /// Counts accumulated since the last sample
    pub pending_counts: SeverityCounts,
    pub last_sample: Option<InstrumentationSample>,
    pub capacity: usize,
    pub overwritten: u64,
}

impl InstrumentationSnapshot {
    pub fn ascending(&self) -> impl Iterator<Item = &Arc<LogRecord>> {
        self.records.iter()
    }

    pub fn descending(&self) -> impl Iterator<Item = &Arc<LogRecord>> {
        self.records.iter().rev()
    }

    pub fn pending(&self, severity: Severity) -> u64 {
        self.pending_counts[severity.index()]
    }
}

pub struct InstrumentationBuffer {
    ring: RecordRing,
    counts: [AtomicU64; Severity::COUNT],
    last_sample: Mutex<Option<InstrumentationSample>>,
}

impl InstrumentationBuffer {
    pub fn new(capacity: usize) -> Self {
        describe_counter!("logdaemon_records_total", "Records accepted, by severity");
        describe_gauge!("logdaemon_queue_depth", "Records waiting for the worker");
        Self {
            ring: RecordRing::new(capacity),
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            last_sample: Mutex::new(None),
        }
    }

    /// Capture a record (producer side)
    pub fn record(&self, record: &Arc<LogRecord>) {
        self.ring.push(Arc::clone(record));
        self.counts[record.severity.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Take and reset the severity counters, publishing them as metrics
    pub fn sample(&self, queue_depth: usize) -> InstrumentationSample {
        let mut counts: SeverityCounts = [0; Severity::COUNT];
        for severity in Severity::ALL {
            let n = self.counts[severity.index()].swap(0, Ordering::Relaxed);
            counts[severity.index()] = n;
            if n > 0 {
                counter!("logdaemon_records_total", "severity" => severity.as_str()).increment(n);
            }
        }
        gauge!("logdaemon_queue_depth").set(queue_depth as f64);

        let sample = InstrumentationSample {
            taken_at: Utc::now(),
            counts,
            queue_depth,
        };
        *sync::lock(&self.last_sample) = Some(sample.clone());
        sample
    }

    /// Copy the current state without resetting anything
    pub fn snapshot(&self) -> InstrumentationSnapshot {
        let mut pending_counts: SeverityCounts = [0; Severity::COUNT];
        for (slot, counter) in pending_counts.iter_mut().zip(self.counts.iter()) {
            *slot = counter.load(Ordering::Relaxed);
        }
        InstrumentationSnapshot {
            records: self.ring.ascending(),
            pending_counts,
            last_sample: sync::lock(&self.last_sample).clone(),
            capacity: self.ring.capacity(),
            overwritten: self.ring.overwritten(),
        }
    }

    pub fn last_sample(&self) -> Option<InstrumentationSample> {
        sync::lock(&self.last_sample).clone()
    }
}
