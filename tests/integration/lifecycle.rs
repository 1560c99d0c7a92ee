// SPDX-License-Identifier: Apache-2.0 OR MIT
use anyhow::Result;
use logdaemon::{
    log_error, log_info, DaemonConfig, DaemonError, Lifecycle, LogDaemon, Severity, Sink,
    SinkError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::common::{fast_config, record, wait_until, RecordingSink};

#[test]
fn test_start_requires_sinks() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    let err = daemon.start().unwrap_err();
    assert!(matches!(err, DaemonError::NoSinks));
    assert_eq!(daemon.lifecycle(), Lifecycle::Inactive);
    Ok(())
}

struct RefusingSink {
    name: &'static str,
    started: AtomicBool,
    stopped: AtomicBool,
    refuse: bool,
}

impl RefusingSink {
    fn new(name: &'static str, refuse: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            refuse,
        })
    }
}

impl Sink for RefusingSink {
    fn name(&self) -> &str {
        self.name
    }

    fn start(&self) -> Result<(), SinkError> {
        if self.refuse {
            return Err(SinkError::Unavailable("port in use".to_string()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, _record: &Arc<logdaemon::LogRecord>) -> Result<(), SinkError> {
        Ok(())
    }

    fn wait_for_complete_stop(&self) -> Result<(), SinkError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_sink_start_failure_rolls_back() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    let good = RefusingSink::new("good", false);
    let bad = RefusingSink::new("bad", true);
    daemon.register_sink(good.clone())?;
    daemon.register_sink(bad.clone())?;

    match daemon.start() {
        Err(DaemonError::SinkStart { name, source }) => {
            assert_eq!(name, "bad");
            assert_eq!(source.to_string(), "sink unavailable: port in use");
        }
        other => panic!("expected SinkStart, got {:?}", other),
    }
    assert!(good.started.load(Ordering::SeqCst));
    assert!(good.stopped.load(Ordering::SeqCst));
    assert!(!bad.stopped.load(Ordering::SeqCst));
    assert_eq!(daemon.lifecycle(), Lifecycle::Inactive);

    // fixing the registration lets the daemon start
    assert!(daemon.unregister_sink("bad").is_some());
    daemon.start()?;
    assert!(daemon.is_active());
    daemon.stop()?;
    Ok(())
}

#[test]
fn test_restart_keeps_delivering() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    let sink = RecordingSink::new("capture").build();
    daemon.register_sink(sink.clone())?;

    for round in 0..3 {
        daemon.start()?;
        daemon.write(record(format!("round {}", round)), false);
        daemon.stop()?;
        // ignored while inactive
        daemon.write(record("between"), false);
    }

    assert_eq!(sink.texts(), vec!["round 0", "round 1", "round 2"]);
    assert_eq!(daemon.diagnostics().rejected_writes, 3);
    Ok(())
}

#[test]
fn test_drop_delivers_pending_records() -> Result<()> {
    let sink = RecordingSink::new("capture").build();
    let handle = {
        let daemon = LogDaemon::new(DaemonConfig {
            write_interval_ms: 10_000,
            ..fast_config()
        })?;
        daemon.register_sink(sink.clone())?;
        daemon.start()?;
        for i in 0..20 {
            daemon.write(record(format!("{}", i)), false);
        }
        daemon.handle()
    };

    assert_eq!(sink.count(), 20);
    assert_eq!(handle.lifecycle(), Lifecycle::Inactive);
    handle.write(record("orphaned"), true);
    assert_eq!(sink.count(), 20);
    Ok(())
}

#[test]
fn test_registration_while_active() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    let first = RecordingSink::new("first").build();
    daemon.register_sink(first.clone())?;
    daemon.start()?;

    daemon.write(record("before"), true);
    assert!(wait_until(Duration::from_secs(2), || first.count() == 1));

    let second = RecordingSink::new("second").order(1).build();
    daemon.register_sink(second.clone())?;
    daemon.write(record("after"), true);
    assert!(wait_until(Duration::from_secs(2), || second.count() == 1));

    let err = daemon
        .register_sink(RecordingSink::new("first").build())
        .unwrap_err();
    assert_eq!(err.to_string(), "sink 'first' is already registered");

    let removed = daemon.unregister_sink("first").expect("registered");
    assert_eq!(removed.name(), "first");
    daemon.write(record("last"), true);
    daemon.stop()?;

    // a pass already in flight may still reach an unregistered sink
    assert_eq!(first.texts()[..2], ["before", "after"]);
    assert_eq!(second.texts(), vec!["after", "last"]);
    Ok(())
}

#[test]
fn test_concurrent_registration_and_traffic() -> Result<()> {
    let daemon = Arc::new(LogDaemon::new(fast_config())?);
    let anchor = RecordingSink::new("anchor").build();
    daemon.register_sink(anchor.clone())?;
    daemon.start()?;

    let producer = {
        let handle = daemon.handle();
        thread::spawn(move || {
            for i in 0..2000 {
                handle.write(record(format!("{}", i)), i % 100 == 0);
            }
        })
    };
    for round in 0..20 {
        let name = format!("transient-{}", round);
        daemon.register_sink(RecordingSink::new(&name).order(round + 1).build())?;
        thread::sleep(Duration::from_millis(1));
        assert!(daemon.unregister_sink(&name).is_some());
    }
    producer.join().expect("producer panicked");
    daemon.stop()?;

    assert_eq!(anchor.count(), 2000);
    assert_eq!(daemon.sink_names(), vec!["anchor"]);
    Ok(())
}

#[test]
fn test_logger_routes_through_daemon() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    let sink = RecordingSink::new("capture").build();
    daemon.register_sink(sink.clone())?;
    daemon.start()?;

    let log = daemon.logger("billing").with_topic("invoices");
    log.set_min_level(Severity::Info);
    log_info!(log, "invoice {} issued", 42);
    log_error!(log, "invoice {} rejected", 43);
    assert!(wait_until(Duration::from_secs(2), || sink.count() == 2));
    daemon.stop()?;

    let records = sink.records();
    assert_eq!(records[0].text, "invoice 42 issued");
    assert_eq!(records[0].source, "billing");
    assert_eq!(records[0].topic, "invoices");
    assert_eq!(records[1].severity, Severity::Error);
    assert_eq!(
        daemon.diagnostics().last_error.map(|r| r.text.clone()),
        Some("invoice 43 rejected".to_string())
    );
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() -> Result<()> {
    // parsing accepts it; validation happens when the daemon is built
    let config = DaemonConfig::parse("{ slice_size: 0 }")?;
    let err = LogDaemon::new(config).err().expect("rejected");
    assert!(matches!(err, DaemonError::Config(_)));
    assert_eq!(
        err.to_string(),
        "invalid configuration: invalid value for 'slice_size': must be greater than zero"
    );
    Ok(())
}

#[test]
fn test_writes_racing_stop_are_never_stranded() -> Result<()> {
    for round in 0..100 {
        let daemon = LogDaemon::new(fast_config())?;
        let sink = RecordingSink::new("capture").build();
        daemon.register_sink(sink.clone())?;
        daemon.start()?;

        let producers: Vec<_> = (0..8)
            .map(|_| {
                let handle = daemon.handle();
                thread::spawn(move || {
                    let mut written = 0u64;
                    loop {
                        handle.write(record("racing"), written % 64 == 0);
                        written += 1;
                        if !handle.is_active() {
                            return written;
                        }
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(2));
        daemon.stop()?;
        let written: u64 = producers
            .into_iter()
            .map(|producer| producer.join().expect("producer panicked"))
            .sum();

        let diagnostics = daemon.diagnostics();
        assert_eq!(diagnostics.queued, 0, "round {} left records queued", round);
        assert_eq!(diagnostics.delivered, sink.count() as u64);
        assert_eq!(
            diagnostics.delivered + diagnostics.rejected_writes,
            written,
            "round {}",
            round
        );
    }
    Ok(())
}
