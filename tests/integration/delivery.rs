// SPDX-License-Identifier: Apache-2.0 OR MIT
use anyhow::Result;
use logdaemon::{DaemonConfig, LogDaemon, Severity};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::common::{fast_config, record, wait_until, RecordingSink};

#[test]
fn test_fifo_single_producer() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    let sink = RecordingSink::new("capture").build();
    daemon.register_sink(sink.clone())?;
    daemon.start()?;

    for i in 0..500 {
        daemon.write(record(format!("{}", i)), i % 50 == 0);
    }
    daemon.stop()?;

    let expected: Vec<String> = (0..500).map(|i| i.to_string()).collect();
    assert_eq!(sink.texts(), expected);
    Ok(())
}

#[test]
fn test_fifo_per_producer_with_many_threads() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    let sink = RecordingSink::new("capture").build();
    daemon.register_sink(sink.clone())?;
    daemon.start()?;

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let handle = daemon.handle();
            thread::spawn(move || {
                for i in 0..250 {
                    handle.write(record(format!("{}:{}", p, i)), false);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer panicked");
    }
    daemon.stop()?;

    let texts = sink.texts();
    assert_eq!(texts.len(), 1000);
    for p in 0..4 {
        let sequence: Vec<u32> = texts
            .iter()
            .filter_map(|t| t.strip_prefix(&format!("{}:", p)))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(sequence, (0..250).collect::<Vec<u32>>(), "producer {}", p);
    }
    Ok(())
}

#[test]
fn test_every_sink_sees_same_order() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    let first = RecordingSink::new("first").order(0).build();
    let second = RecordingSink::new("second").order(1).build();
    daemon.register_sink(second.clone())?;
    daemon.register_sink(first.clone())?;
    daemon.start()?;

    for i in 0..100 {
        daemon.write(record(format!("{}", i)), false);
    }
    daemon.stop()?;

    assert_eq!(first.texts(), second.texts());
    assert_eq!(first.texts().len(), 100);
    assert_eq!(daemon.sink_names(), vec!["first", "second"]);
    Ok(())
}

#[test]
fn test_write_does_not_block_on_slow_sink() -> Result<()> {
    let daemon = LogDaemon::new(DaemonConfig {
        reliable: false,
        ..fast_config()
    })?;
    let sink = RecordingSink::new("slow")
        .delay(Duration::from_millis(50))
        .build();
    daemon.register_sink(sink.clone())?;
    daemon.start()?;

    let mut slowest = Duration::ZERO;
    for i in 0..40 {
        let started = Instant::now();
        daemon.write(record(format!("{}", i)), true);
        slowest = slowest.max(started.elapsed());
    }

    // 40 sends at 50ms each would take two seconds if writes waited
    assert!(slowest < Duration::from_millis(25), "slowest write {:?}", slowest);
    assert!(daemon.queued() > 0);
    daemon.stop()?;
    Ok(())
}

#[test]
fn test_urgent_write_wakes_idle_worker() -> Result<()> {
    let daemon = LogDaemon::new(DaemonConfig {
        write_interval_ms: 10_000,
        tick_ms: 500,
        ..Default::default()
    })?;
    let sink = RecordingSink::new("capture").build();
    daemon.register_sink(sink.clone())?;
    daemon.start()?;
    // let the worker settle into its idle wait
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    daemon.write(record("wake up"), true);
    assert!(wait_until(Duration::from_secs(2), || sink.count() == 1));
    assert!(
        started.elapsed() < Duration::from_millis(400),
        "urgent delivery took {:?}",
        started.elapsed()
    );

    daemon.stop()?;
    Ok(())
}

#[test]
fn test_non_urgent_write_waits_for_interval() -> Result<()> {
    let daemon = LogDaemon::new(DaemonConfig {
        write_interval_ms: 10_000,
        tick_ms: 50,
        ..Default::default()
    })?;
    let sink = RecordingSink::new("capture").build();
    daemon.register_sink(sink.clone())?;
    daemon.start()?;
    thread::sleep(Duration::from_millis(50));

    daemon.write(record("batched"), false);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(sink.count(), 0);

    // stop still delivers it
    daemon.stop()?;
    assert_eq!(sink.texts(), vec!["batched"]);
    Ok(())
}

#[test]
fn test_backlog_drains_without_idle_waits() -> Result<()> {
    let daemon = LogDaemon::new(DaemonConfig {
        write_interval_ms: 10_000,
        tick_ms: 500,
        ..Default::default()
    })?;
    let sink = RecordingSink::new("capture").build();
    daemon.register_sink(sink.clone())?;
    daemon.start()?;
    thread::sleep(Duration::from_millis(50));

    daemon.write(record("first"), true);
    for i in 0..999 {
        daemon.write(record(format!("{}", i)), false);
    }

    // far more than one slice, far less than one write interval
    assert!(wait_until(Duration::from_secs(3), || sink.count() == 1000));
    assert!(wait_until(Duration::from_secs(1), || sink.pulses() >= 1));
    daemon.stop()?;
    Ok(())
}

#[test]
fn test_reliable_stop_delivers_pending() -> Result<()> {
    let daemon = LogDaemon::new(DaemonConfig {
        write_interval_ms: 10_000,
        ..fast_config()
    })?;
    let sink = RecordingSink::new("capture")
        .delay(Duration::from_millis(1))
        .build();
    daemon.register_sink(sink.clone())?;
    daemon.start()?;

    for i in 0..200 {
        daemon.write(record(format!("{}", i)), false);
    }
    daemon.stop()?;

    assert_eq!(sink.count(), 200);
    let diagnostics = daemon.diagnostics();
    assert_eq!(diagnostics.queued, 0);
    assert_eq!(diagnostics.delivered, 200);
    assert_eq!(diagnostics.discarded_on_stop, 0);
    Ok(())
}

#[test]
fn test_unreliable_stop_is_faster() -> Result<()> {
    fn timed_stop(reliable: bool) -> Result<(Duration, usize, u64)> {
        let daemon = LogDaemon::new(DaemonConfig {
            reliable,
            slice_size: 1,
            ..fast_config()
        })?;
        let sink = RecordingSink::new("slow")
            .delay(Duration::from_millis(5))
            .build();
        daemon.register_sink(sink.clone())?;
        daemon.start()?;
        for i in 0..100 {
            daemon.write(record(format!("{}", i)), true);
        }
        let started = Instant::now();
        daemon.stop()?;
        Ok((
            started.elapsed(),
            sink.count(),
            daemon.diagnostics().discarded_on_stop,
        ))
    }

    let (reliable_time, reliable_count, _) = timed_stop(true)?;
    let (unreliable_time, unreliable_count, discarded) = timed_stop(false)?;

    assert_eq!(reliable_count, 100);
    assert!(discarded > 0);
    assert_eq!(unreliable_count as u64 + discarded, 100);
    assert!(
        unreliable_time < reliable_time,
        "unreliable {:?} vs reliable {:?}",
        unreliable_time,
        reliable_time
    );
    Ok(())
}

#[test]
fn test_severity_latches_track_latest() -> Result<()> {
    let daemon = LogDaemon::new(fast_config())?;
    daemon.register_sink(RecordingSink::new("capture").build())?;
    daemon.start()?;

    let severities = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Catastrophic,
    ];
    for severity in severities {
        daemon.write(
            logdaemon::LogRecord::new(severity, "integration", severity.as_str()),
            false,
        );
        let diagnostics = daemon.diagnostics();
        if severity >= Severity::Warning {
            assert_eq!(diagnostics.last_warning.unwrap().severity, severity);
        }
        if severity >= Severity::Error {
            assert_eq!(diagnostics.last_error.unwrap().severity, severity);
        }
    }

    let diagnostics = daemon.diagnostics();
    assert_eq!(
        diagnostics.last_catastrophe.map(|r| r.severity),
        Some(Severity::Catastrophic)
    );
    daemon.stop()?;
    Ok(())
}

#[test]
fn test_instrumentation_samples_and_keeps_recent() -> Result<()> {
    let daemon = LogDaemon::new(DaemonConfig {
        instrumentation_enabled: true,
        instrumentation_buffer_size: 4,
        instrumentation_interval_ms: 20,
        ..fast_config()
    })?;
    daemon.register_sink(RecordingSink::new("capture").build())?;
    daemon.start()?;

    for i in 0..10 {
        daemon.write(record(format!("{}", i)), false);
    }

    assert!(wait_until(Duration::from_secs(3), || {
        daemon
            .instrumentation_snapshot()
            .map(|s| s.last_sample.is_some() && s.pending_counts.iter().all(|n| *n == 0))
            .unwrap_or(false)
    }));

    let snapshot = daemon
        .instrumentation_snapshot()
        .expect("instrumentation enabled");
    let recent: Vec<&str> = snapshot.ascending().map(|r| r.text.as_str()).collect();
    assert_eq!(recent, vec!["6", "7", "8", "9"]);
    assert_eq!(snapshot.overwritten, 6);
    daemon.stop()?;
    Ok(())
}

#[test]
fn test_daemon_from_config_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("logdaemon.json5");
    std::fs::write(
        &path,
        r#"{
            // keep everything in memory
            write_interval_ms: 20,
            default_failover_name: 'fallback',
            sinks: [
                { kind: 'memory', name: 'primary', capacity: 8 },
                { kind: 'memory', name: 'fallback', order: 10 },
            ],
        }"#,
    )?;

    let config = DaemonConfig::load_from_file(&path)?;
    let daemon = LogDaemon::new(config)?;
    assert_eq!(daemon.sink_names(), vec!["primary", "fallback"]);

    daemon.start()?;
    let extra = Arc::new(RecordingSink::new("extra").order(5));
    daemon.register_sink(extra.clone())?;
    daemon.write(record("configured"), true);
    daemon.stop()?;

    assert_eq!(extra.texts(), vec!["configured"]);
    assert_eq!(daemon.diagnostics().delivered, 1);
    Ok(())
}
