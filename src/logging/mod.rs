// SPDX-License-Identifier: Apache-2.0 OR MIT
// Record model and producer-side logging API
//
// Records are plain values until handed to the daemon, which shares them as
// `Arc<LogRecord>` and never mutates them again.

mod logger;
#[macro_use]
mod macros;
pub(crate) mod record;
mod severity;

// Public exports
pub use logger::{Logger, URGENT_THRESHOLD};
pub use record::{LogRecord, DEFAULT_TOPIC};
pub use severity::Severity;
