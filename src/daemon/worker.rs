// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Background delivery worker.
//!
//! Exactly one worker thread drains the queue, which is what gives every
//! sink the records in `write` order. Each pass takes a fresh registry
//! snapshot, delivers up to `slice_size` records, and loops straight away
//! while anything is still queued. Once the queue is empty the sinks are
//! pulsed and the worker idles for `write_interval`, in ticks no longer than
//! `tick` so that a stop request is noticed promptly.
//!
//! Failures sinks report from their own threads arrive as reroutes and are
//! handled at the start of each pass, so every sink call, failover forwards
//! included, is made from this thread.

use super::DaemonCore;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, trace, warn};

pub(crate) const WORKER_THREAD_NAME: &str = "logdaemon-worker";

pub(crate) fn spawn(core: Arc<DaemonCore>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run(&core))
}

fn run(core: &DaemonCore) {
    debug!("worker started");
    let mut next_sample = Instant::now() + core.settings.instrumentation_interval;

    while !core.stop_requested() {
        let rerouted = drain_reroutes(core, true);
        let processed = deliver_pass(core, Some(core.settings.slice_size));

        if core.has_work() {
            maybe_sample(core, &mut next_sample);
            if processed == 0 && rerouted == 0 {
                // A producer has counted a record but not pushed it yet
                thread::yield_now();
            }
            continue;
        }

        if processed > 0 {
            pulse_all(core);
        }
        idle_wait(core, &mut next_sample);
    }

    final_pass(core);
    pulse_all(core);
    debug!("worker stopped");
}

/// Deliver up to `limit` queued records (all of them for `None`) to every
/// sink in the current snapshot. Returns the number of records taken.
fn deliver_pass(core: &DaemonCore, limit: Option<usize>) -> usize {
    let sinks = core.registry.snapshot();
    let mut processed = 0;

    while limit.map_or(true, |limit| processed < limit) {
        let Some(record) = core.queue.pop() else {
            break;
        };
        for entry in sinks.iter() {
            // Failures are routed by the coordinator
            let _ = core.failover.deliver(entry, &record);
        }
        processed += 1;
    }

    if processed > 0 {
        core.queued.fetch_sub(processed, Ordering::AcqRel);
        core.delivered.fetch_add(processed as u64, Ordering::Relaxed);
    }
    processed
}

/// Hand reported failures to the failover coordinator. With `forward` unset
/// the faults are only latched and the records dropped. Returns how many
/// reroutes were taken.
fn drain_reroutes(core: &DaemonCore, forward: bool) -> usize {
    let mut taken = 0;
    while let Some(reroute) = core.reroutes.pop() {
        let record = forward.then_some(&reroute.record);
        core.failover.notify(&reroute.entry, Some(&reroute.error), record);
        taken += 1;
    }
    taken
}

/// Empty the queue on shutdown: deliver everything when reliable, discard
/// otherwise. Pending reroutes follow the same policy. Returns the number of
/// records and reroutes taken.
pub(crate) fn final_pass(core: &DaemonCore) -> usize {
    if core.settings.reliable {
        let rerouted = drain_reroutes(core, true);
        let delivered = deliver_pass(core, None);
        if delivered > 0 {
            debug!(records = delivered, "delivered remaining records on stop");
        }
        return rerouted + delivered;
    }

    let mut discarded = drain_reroutes(core, false);
    let mut popped = 0;
    while core.queue.pop().is_some() {
        popped += 1;
    }
    core.queued.fetch_sub(popped, Ordering::AcqRel);
    discarded += popped;
    if discarded > 0 {
        core.discarded_on_stop
            .fetch_add(discarded as u64, Ordering::Relaxed);
        warn!(records = discarded, "discarded queued records on unreliable stop");
    }
    discarded
}

/// Drop everything still queued after the worker died mid-pass. Records the
/// dead worker had already taken are lost with it and counted as discarded.
///
/// Only valid once producers are quiesced, as `stop` guarantees.
pub(crate) fn abandon(core: &DaemonCore) -> usize {
    let mut popped = 0;
    while core.queue.pop().is_some() {
        popped += 1;
    }
    core.queued.fetch_sub(popped, Ordering::AcqRel);
    // still counted but no longer queued: taken by the dead worker
    let taken = core.queued();
    core.queued.fetch_sub(taken, Ordering::AcqRel);

    let discarded = popped + taken + drain_reroutes(core, false);
    core.discarded_on_stop
        .fetch_add(discarded as u64, Ordering::Relaxed);
    discarded
}

pub(crate) fn pulse_all(core: &DaemonCore) {
    for entry in core.registry.snapshot().iter() {
        let _ = core.failover.pulse(entry);
    }
}

/// Sleep until `write_interval` has passed, an urgent write arrives, or stop
/// is requested
fn idle_wait(core: &DaemonCore, next_sample: &mut Instant) {
    let deadline = Instant::now() + core.settings.write_interval;
    loop {
        maybe_sample(core, next_sample);
        if core.stop_requested() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let wait = (deadline - now).min(core.settings.tick);
        if core.wake.wait_timeout(wait) {
            return;
        }
    }
}

fn maybe_sample(core: &DaemonCore, next_sample: &mut Instant) {
    let Some(instrumentation) = &core.instrumentation else {
        return;
    };
    let now = Instant::now();
    if now < *next_sample {
        return;
    }
    *next_sample = now + core.settings.instrumentation_interval;
    let sample = instrumentation.sample(core.queued());
    trace!(
        records = sample.total(),
        queue_depth = sample.queue_depth,
        "instrumentation sample"
    );
}
