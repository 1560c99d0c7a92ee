// SPDX-License-Identifier: Apache-2.0 OR MIT
// In-memory sink - keeps the most recent records for inspection

use super::{LatencyTracker, Sink, SinkError, SinkSettings};
use crate::logging::LogRecord;
use crate::sync;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Bounded capture of delivered records, oldest evicted first.
///
/// Useful as a failover target of last resort and in tests.
pub struct MemorySink {
    settings: SinkSettings,
    capacity: usize,
    records: Mutex<VecDeque<Arc<LogRecord>>>,
    evicted: AtomicU64,
    pulses: AtomicU64,
    latency: LatencyTracker,
}

impl MemorySink {
    pub fn new(settings: SinkSettings, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            settings,
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            evicted: AtomicU64::new(0),
            pulses: AtomicU64::new(0),
            latency: LatencyTracker::new(),
        }
    }

    /// Captured records, oldest first
    pub fn records(&self) -> Vec<Arc<LogRecord>> {
        sync::lock(&self.records).iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        sync::lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records dropped to make room
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::Relaxed)
    }

    /// Remove and return everything captured so far
    pub fn take(&self) -> Vec<Arc<LogRecord>> {
        sync::lock(&self.records).drain(..).collect()
    }
}

impl Sink for MemorySink {
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
        let started = Instant::now();
        let mut records = sync::lock(&self.records);
        if records.len() == self.capacity {
            records.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        records.push_back(Arc::clone(record));
        drop(records);
        self.latency.record(started.elapsed());
        Ok(())
    }

    fn pulse(&self) -> Result<(), SinkError> {
        self.pulses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
