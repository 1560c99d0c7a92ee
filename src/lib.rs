// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Asynchronous log daemon.
//!
//! Producers hand records to [`LogDaemon::write`] (or a [`Logger`]) without
//! blocking; one background worker delivers them in order to every
//! registered [`Sink`], rerouting failed deliveries through the failover
//! coordinator.
//!
//! ```ignore
//! let daemon = LogDaemon::new(DaemonConfig::default())?;
//! daemon.register_sink(Arc::new(ConsoleSink::stdout(SinkSettings::new("console"))))?;
//! daemon.start()?;
//!
//! let log = daemon.logger("api");
//! log_info!(log, "listening on {}", addr);
//!
//! daemon.stop()?;
//! ```

pub mod config;
pub mod daemon;
pub mod instrumentation;
#[macro_use]
pub mod logging;
pub mod sink;
mod sync;

pub use config::{ConfigError, DaemonConfig, SinkConfig, SinkKind};
pub use daemon::{DaemonError, DaemonHandle, Diagnostics, Lifecycle, LogDaemon};
pub use instrumentation::{InstrumentationSample, InstrumentationSnapshot};
pub use logging::{LogRecord, Logger, Severity};
pub use sink::{
    ConsoleFormat, ConsoleSink, ConsoleTarget, MemorySink, Sink, SinkError, SinkSettings,
};
