// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Worker wake-up signal.
//!
//! Producers signal when an urgent record lands in an empty queue and `stop`
//! signals to cut the idle wait short. The worker blocks in bounded ticks so
//! it also notices the stop flag without a signal.
//!
//! A signal raised while the worker is busy stays pending and makes the next
//! wait return immediately, so no wake-up is lost between a check of the
//! queue and the start of a wait.

use crate::sync;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct WakeSignal {
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl WakeSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wake the worker (or arm the next wait)
    pub(crate) fn signal(&self) {
        *sync::lock(&self.pending) = true;
        self.condvar.notify_one();
    }

    /// Block for up to `timeout`; returns true if woken by a signal.
    ///
    /// Consumes the pending signal.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let pending = sync::lock(&self.pending);
        let (mut pending, _) = self
            .condvar
            .wait_timeout_while(pending, timeout, |pending| !*pending)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::replace(&mut *pending, false)
    }

    /// Drop any pending signal
    pub(crate) fn clear(&self) {
        *sync::lock(&self.pending) = false;
    }
}
