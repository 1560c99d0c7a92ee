// SPDX-License-Identifier: Apache-2.0 OR MIT
// Severity latches - most recent record at or above each threshold

use crate::logging::{LogRecord, Severity};
use crate::sync;
use std::sync::{Arc, Mutex};

pub const WARNING_THRESHOLD: Severity = Severity::Warning;
pub const ERROR_THRESHOLD: Severity = Severity::Error;
pub const CATASTROPHE_THRESHOLD: Severity = Severity::Catastrophic;

/// Latched records, overwritten on every qualifying write and never cleared
#[derive(Debug, Default)]
pub(crate) struct SeverityLatches {
    warning: Mutex<Option<Arc<LogRecord>>>,
    error: Mutex<Option<Arc<LogRecord>>>,
    catastrophe: Mutex<Option<Arc<LogRecord>>>,
}

impl SeverityLatches {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Latch `record` into every slot whose threshold it reaches
    pub(crate) fn update(&self, record: &Arc<LogRecord>) {
        let severity = record.severity;
        if !severity.is_at_least(WARNING_THRESHOLD) {
            return;
        }
        *sync::lock(&self.warning) = Some(Arc::clone(record));
        if severity.is_at_least(ERROR_THRESHOLD) {
            *sync::lock(&self.error) = Some(Arc::clone(record));
        }
        if severity.is_at_least(CATASTROPHE_THRESHOLD) {
            *sync::lock(&self.catastrophe) = Some(Arc::clone(record));
        }
    }

    pub(crate) fn last_warning(&self) -> Option<Arc<LogRecord>> {
        sync::lock(&self.warning).clone()
    }

    pub(crate) fn last_error(&self) -> Option<Arc<LogRecord>> {
        sync::lock(&self.error).clone()
    }

    pub(crate) fn last_catastrophe(&self) -> Option<Arc<LogRecord>> {
        sync::lock(&self.catastrophe).clone()
    }
}
