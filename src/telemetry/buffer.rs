//! # Bounded Event Buffer
//!
//! Fixed-capacity, insertion-ordered ring buffer of journal records.
//!
//! Records enter as *pending*. A flush writes the pending records to the
//! durable store, marks them persisted and then runs the retain-last step:
//! everything except the most recent record is dropped. The survivor stays
//! resident (so the latest data point never requires a disk read) but is
//! not written or counted a second time.

use std::collections::VecDeque;

use super::record::TelemetrySample;

#[derive(Debug, Clone)]
struct Resident<R> {
    record: R,
    persisted: bool,
}

/// Ring buffer holding at most `capacity` records
#[derive(Debug, Clone)]
pub struct EventBuffer<R> {
    slots: VecDeque<Resident<R>>,
    capacity: usize,
}

impl<R> EventBuffer<R> {
    /// Creates an empty buffer.
    ///
    /// A capacity below 1 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident records, persisted or not
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Most recently inserted record
    pub fn last(&self) -> Option<&R> {
        self.slots.back().map(|slot| &slot.record)
    }

    /// Insert at the tail.
    ///
    /// Returns the evicted head record when the buffer was already full.
    pub fn push(&mut self, record: R) -> Option<R> {
        let evicted = if self.is_full() {
            self.slots.pop_front().map(|slot| slot.record)
        } else {
            None
        };
        self.slots.push_back(Resident { record, persisted: false });
        evicted
    }

    /// All resident records in insertion order
    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.slots.iter().map(|slot| &slot.record)
    }

    /// Records not yet written to the durable store, in insertion order
    pub fn pending(&self) -> impl Iterator<Item = &R> {
        self.slots
            .iter()
            .filter(|slot| !slot.persisted)
            .map(|slot| &slot.record)
    }

    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.persisted).count()
    }

    /// Post-flush step: every resident record is now on disk.
    pub fn mark_persisted(&mut self) {
        for slot in &mut self.slots {
            slot.persisted = true;
        }
    }

    /// Post-flush step: drop everything except the most recent record.
    pub fn retain_last(&mut self) {
        if self.slots.len() > 1 {
            let start = self.slots.len() - 1;
            self.slots.drain(..start);
        }
    }
}

impl EventBuffer<TelemetrySample> {
    /// Dedup rule for telemetry: a sample is worth keeping when the buffer is
    /// empty or its voltage differs from the last buffered one. RSSI changes
    /// alone never create a record.
    pub fn accepts(&self, sample: &TelemetrySample) -> bool {
        match self.last() {
            Some(last) => last.battery_voltage != sample.battery_voltage,
            None => true,
        }
    }
}
