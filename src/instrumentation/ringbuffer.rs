// SPDX-License-Identifier: Apache-2.0 OR MIT
// Fixed-capacity ring of recent records
//
// Writers reserve a sequence number with one atomic increment and then fill
// slot `seq % capacity`. Each slot remembers the sequence it holds, so a slow
// writer never clobbers a newer record that lapped it.

use crate::logging::LogRecord;
use crate::sync;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Slot = Mutex<Option<(u64, Arc<LogRecord>)>>;

pub struct RecordRing {
    slots: Box<[Slot]>,
    capacity: usize,
    write_seq: AtomicU64,
    overwritten: AtomicU64,
}

impl RecordRing {
    /// Create a ring holding at most `capacity` records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots: Vec<Slot> = (0..capacity).map(|_| Mutex::new(None)).collect();
        Self {
            slots: slots.into_boxed_slice(),
            capacity,
            write_seq: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    /// Add a record, evicting the oldest once full. Never blocks on readers
    /// for longer than one slot copy.
    pub fn push(&self, record: Arc<LogRecord>) {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let pos = (seq % self.capacity as u64) as usize;

        let mut slot = sync::lock(&self.slots[pos]);
        let stale = match slot.as_ref() {
            Some((held, _)) => {
                self.overwritten.fetch_add(1, Ordering::Relaxed);
                *held > seq
            }
            None => false,
        };
        // A newer record already lapped this one; it counts as evicted
        if !stale {
            *slot = Some((seq, record));
        }
    }

    /// Held records, oldest first
    pub fn ascending(&self) -> Vec<Arc<LogRecord>> {
        let mut held: Vec<(u64, Arc<LogRecord>)> = self
            .slots
            .iter()
            .filter_map(|slot| sync::lock(slot).clone())
            .collect();
        held.sort_by_key(|(seq, _)| *seq);
        held.into_iter().map(|(_, record)| record).collect()
    }

    /// Held records, newest first
    pub fn descending(&self) -> Vec<Arc<LogRecord>> {
        let mut records = self.ascending();
        records.reverse();
        records
    }

    pub fn len(&self) -> usize {
        (self.write_seq.load(Ordering::Relaxed) as usize).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.write_seq.load(Ordering::Relaxed) == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records evicted to make room
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Records ever pushed
    pub fn total_written(&self) -> u64 {
        self.write_seq.load(Ordering::Relaxed)
    }
}
