// SPDX-License-Identifier: Apache-2.0 OR MIT
// Ordered, copy-on-write sink registry

use super::Sink;
use crate::sync;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Registration attempted with a name already present
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sink '{0}' is already registered")]
pub struct DuplicateSink(pub String);

/// A registered sink plus the bookkeeping the daemon keeps for it
pub struct SinkEntry {
    sink: Arc<dyn Sink>,
    registration: u64,
    /// Set after a failed send/pulse, cleared by the next success
    faulted: AtomicBool,
}

impl SinkEntry {
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    pub fn name(&self) -> &str {
        self.sink.name()
    }

    /// Monotonic registration sequence number
    pub fn registration(&self) -> u64 {
        self.registration
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// Record a failure; returns true if the sink was healthy before
    pub(crate) fn mark_faulted(&self) -> bool {
        !self.faulted.swap(true, Ordering::AcqRel)
    }

    /// Record a success; returns true if the sink was faulted before
    pub(crate) fn mark_healthy(&self) -> bool {
        self.faulted.swap(false, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for SinkEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkEntry")
            .field("name", &self.name())
            .field("order", &self.sink.order())
            .field("registration", &self.registration)
            .field("faulted", &self.is_faulted())
            .finish()
    }
}

/// Sinks keyed by unique name, iterated in ascending `order`.
///
/// Mutations replace the whole entry list, so a snapshot taken by the worker
/// stays valid for the rest of its pass no matter what admin threads do.
/// Ties in `order` keep registration order.
pub struct SinkRegistry {
    entries: RwLock<Arc<Vec<Arc<SinkEntry>>>>,
    next_registration: AtomicU64,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            next_registration: AtomicU64::new(0),
        }
    }

    /// Add a sink, rejecting duplicate names
    pub fn register(&self, sink: Arc<dyn Sink>) -> Result<Arc<SinkEntry>, DuplicateSink> {
        let mut entries = sync::write(&self.entries);
        if entries.iter().any(|entry| entry.name() == sink.name()) {
            return Err(DuplicateSink(sink.name().to_string()));
        }

        let entry = Arc::new(SinkEntry {
            registration: self.next_registration.fetch_add(1, Ordering::Relaxed),
            faulted: AtomicBool::new(false),
            sink,
        });

        let order = entry.sink.order();
        let mut next: Vec<Arc<SinkEntry>> = entries.as_ref().clone();
        // Insert after every entry with order <= ours to keep ties stable
        let pos = next.partition_point(|existing| existing.sink.order() <= order);
        next.insert(pos, Arc::clone(&entry));
        *entries = Arc::new(next);
        Ok(entry)
    }

    /// Remove a sink by name, handing it back to the caller
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Sink>> {
        let mut entries = sync::write(&self.entries);
        let idx = entries.iter().position(|entry| entry.name() == name)?;
        let mut next: Vec<Arc<SinkEntry>> = entries.as_ref().clone();
        let removed = next.remove(idx);
        *entries = Arc::new(next);
        Some(Arc::clone(&removed.sink))
    }

    /// Immutable view in delivery order
    pub fn snapshot(&self) -> Arc<Vec<Arc<SinkEntry>>> {
        Arc::clone(&sync::read(&self.entries))
    }

    /// Look up an entry by name
    pub fn entry(&self, name: &str) -> Option<Arc<SinkEntry>> {
        sync::read(&self.entries)
            .iter()
            .find(|entry| entry.name() == name)
            .cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Sink>> {
        self.entry(name).map(|entry| Arc::clone(&entry.sink))
    }

    /// Sink names in delivery order
    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|entry| entry.name().to_string())
            .collect()
    }

    /// Entries newest registration first, the order sinks are stopped in
    pub fn in_stop_order(&self) -> Vec<Arc<SinkEntry>> {
        let mut entries: Vec<Arc<SinkEntry>> = self.snapshot().as_ref().clone();
        entries.sort_by(|a, b| b.registration.cmp(&a.registration));
        entries
    }

    /// Entries oldest registration first, the order sinks are started in
    pub fn in_start_order(&self) -> Vec<Arc<SinkEntry>> {
        let mut entries = self.in_stop_order();
        entries.reverse();
        entries
    }

    pub fn len(&self) -> usize {
        sync::read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
