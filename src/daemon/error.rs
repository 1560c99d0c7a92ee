// SPDX-License-Identifier: Apache-2.0 OR MIT
// Daemon administration errors

use crate::config::ConfigError;
use crate::sink::{DuplicateSink, SinkError};
use thiserror::Error;

/// Errors returned by daemon construction and admin operations.
///
/// `write` has no error channel; these only come back from `new`, `start`,
/// `stop`, and sink registration.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    DuplicateSink(#[from] DuplicateSink),

    #[error("no sinks registered and sinks are not optional")]
    NoSinks,

    #[error("sink '{name}' failed to start")]
    SinkStart {
        name: String,
        #[source]
        source: SinkError,
    },

    #[error("daemon is {0}, operation not allowed")]
    InvalidState(&'static str),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("worker thread panicked")]
    WorkerPanicked,
}
