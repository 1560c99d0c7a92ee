// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The log daemon: a non-blocking entry point for producers and a single
//! background worker that fans records out to the registered sinks.
//!
//! ```text
//! producers --write--> SegQueue --worker--> sink 0, sink 1, ... (ascending order)
//!                                              |
//!                                              +-- on failure --> FailoverCoordinator
//! ```
//!
//! `write` never blocks and never fails. Administrative calls (`start`,
//! `stop`, sink registration) are serialized with each other but never
//! contend with `write`.
//!
//! All sink I/O happens on the worker. Failures a sink reports from its own
//! threads through [`DaemonHandle::notify`] are queued as reroutes and
//! handled on the worker's next pass.

mod error;
mod latches;
mod wakeup;
mod worker;

pub use error::DaemonError;
pub use latches::{CATASTROPHE_THRESHOLD, ERROR_THRESHOLD, WARNING_THRESHOLD};

use crate::config::DaemonConfig;
use crate::instrumentation::{InstrumentationBuffer, InstrumentationSnapshot};
use crate::logging::{LogRecord, Logger};
use crate::sink::failover::contain;
use crate::sink::{
    DuplicateSink, FailoverCoordinator, FailoverFault, FailoverStats, Sink, SinkEntry, SinkError,
    SinkFault, SinkRegistry,
};
use crate::sync;
use crossbeam_queue::SegQueue;
use latches::SeverityLatches;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};
use wakeup::WakeSignal;

/// Daemon lifecycle: `Inactive -> Starting -> Active -> Stopping -> Inactive`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    Inactive = 0,
    Starting = 1,
    Active = 2,
    Stopping = 3,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Lifecycle::Starting,
            2 => Lifecycle::Active,
            3 => Lifecycle::Stopping,
            _ => Lifecycle::Inactive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Inactive => "inactive",
            Lifecycle::Starting => "starting",
            Lifecycle::Active => "active",
            Lifecycle::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker timing and drain policy, fixed at construction
#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub(crate) write_interval: Duration,
    pub(crate) tick: Duration,
    pub(crate) slice_size: usize,
    pub(crate) reliable: bool,
    pub(crate) instrumentation_interval: Duration,
    pub(crate) sinks_are_optional: bool,
}

/// A failed record reported from outside the worker, waiting to be rerouted
pub(crate) struct Reroute {
    pub(crate) entry: Arc<SinkEntry>,
    pub(crate) error: SinkError,
    pub(crate) record: Arc<LogRecord>,
}

/// Counts one producer inside the admission window, released on drop
struct Admission<'a>(&'a AtomicUsize);

impl<'a> Admission<'a> {
    fn enter(in_flight: &'a AtomicUsize) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self(in_flight)
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// State shared by the daemon, its handles, and the worker thread
pub(crate) struct DaemonCore {
    pub(crate) settings: WorkerSettings,
    lifecycle: AtomicU8,
    pub(crate) queue: SegQueue<Arc<LogRecord>>,
    /// Incremented before the push and decremented after delivery, so it
    /// never undercounts what is in the queue
    pub(crate) queued: AtomicUsize,
    /// Producers between their lifecycle check and their push
    in_flight: AtomicUsize,
    pub(crate) reroutes: SegQueue<Reroute>,
    stop_requested: AtomicBool,
    pub(crate) wake: WakeSignal,
    pub(crate) registry: Arc<SinkRegistry>,
    pub(crate) failover: FailoverCoordinator,
    latches: SeverityLatches,
    pub(crate) instrumentation: Option<InstrumentationBuffer>,
    pub(crate) delivered: AtomicU64,
    rejected_writes: AtomicU64,
    pub(crate) discarded_on_stop: AtomicU64,
}

impl DaemonCore {
    pub(crate) fn new(config: &DaemonConfig) -> Self {
        let registry = Arc::new(SinkRegistry::new());
        let failover = FailoverCoordinator::new(
            Arc::clone(&registry),
            config.default_failover_name.clone(),
            config.max_nested_failures,
        );
        let instrumentation = config
            .instrumentation_enabled
            .then(|| InstrumentationBuffer::new(config.instrumentation_buffer_size));

        Self {
            settings: WorkerSettings {
                write_interval: config.write_interval(),
                tick: config.tick(),
                slice_size: config.slice_size.max(1),
                reliable: config.reliable,
                instrumentation_interval: config.instrumentation_interval(),
                sinks_are_optional: config.sinks_are_optional,
            },
            lifecycle: AtomicU8::new(Lifecycle::Inactive as u8),
            queue: SegQueue::new(),
            queued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            reroutes: SegQueue::new(),
            stop_requested: AtomicBool::new(false),
            wake: WakeSignal::new(),
            registry,
            failover,
            latches: SeverityLatches::new(),
            instrumentation,
            delivered: AtomicU64::new(0),
            rejected_writes: AtomicU64::new(0),
            discarded_on_stop: AtomicU64::new(0),
        }
    }

    // SeqCst pairs with the admission counter: a producer either sees
    // `Stopping` or is seen by `wait_for_producers`.
    pub(crate) fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::SeqCst))
    }

    pub(crate) fn set_lifecycle(&self, state: Lifecycle) {
        self.lifecycle.store(state as u8, Ordering::SeqCst);
    }

    /// Run `push` if the daemon is active. Returns false when it was not.
    fn admit(&self, push: impl FnOnce()) -> bool {
        let _admission = Admission::enter(&self.in_flight);
        if self.lifecycle() != Lifecycle::Active {
            return false;
        }
        push();
        true
    }

    /// Spin until every admitted producer has finished its push. Callers
    /// must have left `Active` first, so no new producer gets in.
    fn wait_for_producers(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            std::thread::yield_now();
        }
    }

    /// Anything left for the worker: queued records or pending reroutes
    pub(crate) fn has_work(&self) -> bool {
        self.queued() > 0 || !self.reroutes.is_empty()
    }

    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.signal();
    }

    /// Producer entry point; see [`DaemonHandle::write`]
    pub(crate) fn write(&self, record: Arc<LogRecord>, urgent: bool) {
        let accepted = self.admit(|| {
            self.latches.update(&record);
            if let Some(instrumentation) = &self.instrumentation {
                instrumentation.record(&record);
            }

            let previous = self.queued.fetch_add(1, Ordering::AcqRel);
            self.queue.push(record);
            if urgent && previous == 0 {
                self.wake.signal();
            }
        });
        if !accepted {
            self.rejected_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            lifecycle: self.lifecycle(),
            queued: self.queued(),
            delivered: self.delivered.load(Ordering::Relaxed),
            sinks: self.registry.names(),
            last_warning: self.latches.last_warning(),
            last_error: self.latches.last_error(),
            last_catastrophe: self.latches.last_catastrophe(),
            failover_error: self.failover.failover_error(),
            sink_faults: self.failover.sink_faults(),
            failover: self.failover.stats(),
            rejected_writes: self.rejected_writes.load(Ordering::Relaxed),
            discarded_on_stop: self.discarded_on_stop.load(Ordering::Relaxed),
        }
    }

    /// Stop one sink, containing its failure
    fn stop_sink(&self, entry: &SinkEntry) {
        if let Err(err) = contain(|| entry.sink().wait_for_complete_stop()) {
            warn!(sink = %entry.name(), error = %err, "sink failed to stop cleanly");
            self.failover.notify(entry, Some(&err), None);
        }
    }
}

/// Point-in-time view of the daemon's health
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub lifecycle: Lifecycle,
    /// Records accepted but not yet taken by the worker
    pub queued: usize,
    /// Records taken off the queue and handed to the sinks
    pub delivered: u64,
    /// Registered sinks in delivery order
    pub sinks: Vec<String>,
    pub last_warning: Option<Arc<LogRecord>>,
    pub last_error: Option<Arc<LogRecord>>,
    pub last_catastrophe: Option<Arc<LogRecord>>,
    /// Latest failure while forwarding to a failover target
    pub failover_error: Option<FailoverFault>,
    pub sink_faults: Vec<SinkFault>,
    pub failover: FailoverStats,
    /// Writes ignored because the daemon was not active
    pub rejected_writes: u64,
    /// Records dropped by an unreliable stop
    pub discarded_on_stop: u64,
}

impl Diagnostics {
    /// Name of the sink behind the latest failover error
    pub fn failover_error_sink(&self) -> Option<&str> {
        self.failover_error.as_ref().map(|fault| fault.sink.as_str())
    }
}

/// Cloneable producer-side handle to a daemon.
///
/// Handles stay valid after the daemon is dropped; writes through them are
/// then ignored.
#[derive(Clone)]
pub struct DaemonHandle {
    core: Arc<DaemonCore>,
}

impl DaemonHandle {
    /// Queue a record for delivery.
    ///
    /// Never blocks and never fails. Ignored unless the daemon is active.
    /// `urgent` wakes an idle worker immediately instead of letting the record
    /// wait for the next write interval.
    pub fn write(&self, record: impl Into<Arc<LogRecord>>, urgent: bool) {
        self.core.write(record.into(), urgent);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.core.lifecycle()
    }

    pub fn is_active(&self) -> bool {
        self.core.lifecycle() == Lifecycle::Active
    }

    /// Records waiting for the worker
    pub fn queued(&self) -> usize {
        self.core.queued()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.core.diagnostics()
    }

    /// Current instrumentation contents, `None` when instrumentation is off
    pub fn instrumentation_snapshot(&self) -> Option<InstrumentationSnapshot> {
        self.core
            .instrumentation
            .as_ref()
            .map(InstrumentationBuffer::snapshot)
    }

    /// Report a failure (or recovery, with no error) from a sink's own
    /// background work.
    ///
    /// Fault latches are updated immediately. A failed record is rerouted by
    /// the worker on its next pass, never on the calling thread; while the
    /// daemon is not active it is only latched. Returns false if no sink with
    /// that name is registered.
    pub fn notify(
        &self,
        sink: &str,
        error: Option<SinkError>,
        record: Option<Arc<LogRecord>>,
    ) -> bool {
        let Some(entry) = self.core.registry.entry(sink) else {
            return false;
        };
        let Some(error) = error else {
            entry.mark_healthy();
            self.core.failover.notify(&entry, None, None);
            return true;
        };

        entry.mark_faulted();
        let Some(record) = record else {
            self.core.failover.notify(&entry, Some(&error), None);
            return true;
        };

        let core = &self.core;
        let mut pending = Some(Reroute {
            entry: Arc::clone(&entry),
            error,
            record,
        });
        let queued = core.admit(|| {
            if let Some(reroute) = pending.take() {
                core.reroutes.push(reroute);
                core.wake.signal();
            }
        });
        if !queued {
            if let Some(reroute) = pending {
                core.failover.notify(&entry, Some(&reroute.error), None);
            }
        }
        true
    }

    pub fn logger(&self, source: impl Into<String>) -> Logger {
        Logger::new(self.clone(), source)
    }
}

impl std::fmt::Debug for DaemonHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonHandle")
            .field("lifecycle", &self.lifecycle())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Asynchronous log daemon.
///
/// Dropping the daemon stops it.
pub struct LogDaemon {
    handle: DaemonHandle,
    /// Worker join handle; its lock also serializes admin operations
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogDaemon {
    /// Create an inactive daemon, registering any sinks the config declares
    pub fn new(config: DaemonConfig) -> Result<Self, DaemonError> {
        config.validate()?;

        let core = Arc::new(DaemonCore::new(&config));
        for sink in &config.sinks {
            core.registry.register(sink.build())?;
        }

        Ok(Self {
            handle: DaemonHandle { core },
            worker: Mutex::new(None),
        })
    }

    /// Producer handle that can be cloned across threads
    pub fn handle(&self) -> DaemonHandle {
        self.handle.clone()
    }

    fn core(&self) -> &Arc<DaemonCore> {
        &self.handle.core
    }

    /// Start sinks in registration order, then the worker.
    ///
    /// If a sink fails to start, the sinks already started are stopped again
    /// (newest first) and the daemon stays inactive.
    pub fn start(&self) -> Result<(), DaemonError> {
        let mut worker = sync::lock(&self.worker);
        let core = self.core();

        let state = core.lifecycle();
        if state != Lifecycle::Inactive {
            return Err(DaemonError::InvalidState(state.as_str()));
        }
        if core.registry.is_empty() && !core.settings.sinks_are_optional {
            return Err(DaemonError::NoSinks);
        }

        core.set_lifecycle(Lifecycle::Starting);

        let mut started: Vec<Arc<SinkEntry>> = Vec::new();
        for entry in core.registry.in_start_order() {
            if let Err(source) = contain(|| entry.sink().start()) {
                error!(sink = %entry.name(), error = %source, "sink failed to start");
                for started_entry in started.iter().rev() {
                    core.stop_sink(started_entry);
                }
                core.set_lifecycle(Lifecycle::Inactive);
                return Err(DaemonError::SinkStart {
                    name: entry.name().to_string(),
                    source,
                });
            }
            started.push(entry);
        }

        core.stop_requested.store(false, Ordering::Release);
        core.wake.clear();
        match worker::spawn(Arc::clone(core)) {
            Ok(handle) => *worker = Some(handle),
            Err(err) => {
                error!(error = %err, "failed to spawn worker thread");
                for started_entry in started.iter().rev() {
                    core.stop_sink(started_entry);
                }
                core.set_lifecycle(Lifecycle::Inactive);
                return Err(DaemonError::Spawn(err));
            }
        }

        core.set_lifecycle(Lifecycle::Active);
        info!(sinks = started.len(), "log daemon started");
        Ok(())
    }

    /// Finish delivery and stop every sink, newest registration first.
    ///
    /// Does nothing unless the daemon is active. With `reliable` set, every
    /// record accepted before `stop` is delivered before it returns.
    pub fn stop(&self) -> Result<(), DaemonError> {
        let mut worker = sync::lock(&self.worker);
        let core = self.core();

        if core.lifecycle() != Lifecycle::Active {
            return Ok(());
        }

        core.set_lifecycle(Lifecycle::Stopping);
        // Writes admitted before the transition land before the final pass
        core.wait_for_producers();
        core.request_stop();

        let panicked = match worker.take() {
            Some(handle) => handle.join().is_err(),
            None => false,
        };

        if panicked {
            let discarded = worker::abandon(core);
            error!(discarded, "worker thread panicked, queued records dropped");
        }

        for entry in core.registry.in_stop_order() {
            core.stop_sink(&entry);
        }

        core.set_lifecycle(Lifecycle::Inactive);
        info!(
            delivered = core.delivered.load(Ordering::Relaxed),
            discarded = core.discarded_on_stop.load(Ordering::Relaxed),
            "log daemon stopped"
        );

        if panicked {
            return Err(DaemonError::WorkerPanicked);
        }
        Ok(())
    }

    /// Add a sink. While active, the sink is started first and a start
    /// failure rejects the registration.
    pub fn register_sink(&self, sink: Arc<dyn Sink>) -> Result<(), DaemonError> {
        let _admin = sync::lock(&self.worker);
        let core = self.core();

        if core.lifecycle() == Lifecycle::Active {
            if core.registry.entry(sink.name()).is_some() {
                return Err(DuplicateSink(sink.name().to_string()).into());
            }
            if let Err(source) = contain(|| sink.start()) {
                return Err(DaemonError::SinkStart {
                    name: sink.name().to_string(),
                    source,
                });
            }
        }

        let entry = core.registry.register(sink)?;
        info!(sink = %entry.name(), order = entry.sink().order(), "sink registered");
        Ok(())
    }

    /// Remove a sink and hand it back.
    ///
    /// The sink is not stopped; the caller owns its shutdown. A pass already
    /// in progress may still deliver to it.
    pub fn unregister_sink(&self, name: &str) -> Option<Arc<dyn Sink>> {
        let _admin = sync::lock(&self.worker);
        let removed = self.core().registry.unregister(name);
        if removed.is_some() {
            info!(sink = %name, "sink unregistered");
        }
        removed
    }

    pub fn write(&self, record: impl Into<Arc<LogRecord>>, urgent: bool) {
        self.handle.write(record, urgent);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.handle.lifecycle()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    pub fn queued(&self) -> usize {
        self.handle.queued()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.core().registry.names()
    }

    pub fn sink(&self, name: &str) -> Option<Arc<dyn Sink>> {
        self.core().registry.get(name)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.handle.diagnostics()
    }

    pub fn instrumentation_snapshot(&self) -> Option<InstrumentationSnapshot> {
        self.handle.instrumentation_snapshot()
    }

    pub fn logger(&self, source: impl Into<String>) -> Logger {
        self.handle.logger(source)
    }
}

impl Drop for LogDaemon {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "log daemon did not stop cleanly");
        }
    }
}
