//! Pending Retune Queue
//!
//! Bounded FIFO of retune requests waiting for their sample to come around.
//! When full, new requests are refused (the queue is never rotated), which
//! keeps already-accepted requests intact under command floods.

use crate::stream_tags::TagValue;
use crate::types::{TimingError, TimingResult};
use std::collections::VecDeque;
use std::fmt;

/// Capacity of the pending retune queue.
pub const RETUNE_QUEUE_CAPACITY: usize = 64;

/// Where a pending retune should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetuneTarget {
    /// No time was given: tag the first sample of the next batch.
    Immediate,
    /// Absolute stream sample. May be negative or already behind the read
    /// position, in which case it fires at the start of the next batch.
    AtSample(i64),
}

impl fmt::Display for RetuneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetuneTarget::Immediate => write!(f, "immediate"),
            RetuneTarget::AtSample(s) => write!(f, "sample {s}"),
        }
    }
}

/// What to do with the queue head for a batch covering [start, start + len).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Tag at this absolute offset and dequeue.
    FireAt(u64),
    /// Target lies beyond this batch; stop servicing.
    Wait,
}

impl RetuneTarget {
    /// Decide where this target fires within the batch [start, start + len).
    pub fn disposition(&self, start: u64, len: usize) -> Disposition {
        match *self {
            RetuneTarget::Immediate => Disposition::FireAt(start),
            RetuneTarget::AtSample(target) => {
                let target = target as i128;
                let start_i = start as i128;
                if target < start_i {
                    Disposition::FireAt(start)
                } else if target < start_i + len as i128 {
                    Disposition::FireAt(target as u64)
                } else {
                    Disposition::Wait
                }
            }
        }
    }
}

/// A retune request awaiting its sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRetune {
    pub target: RetuneTarget,
    /// Payload attached to the output tag.
    pub value: TagValue,
}

impl PendingRetune {
    pub fn new(target: RetuneTarget, value: TagValue) -> Self {
        Self { target, value }
    }
}

/// Bounded FIFO of pending retunes.
#[derive(Debug, Clone)]
pub struct RetuneQueue {
    entries: VecDeque<PendingRetune>,
    capacity: usize,
}

impl RetuneQueue {
    pub fn new() -> Self {
        Self::with_capacity(RETUNE_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a request, or refuse it with `QueueOverflow` when full.
    /// A refused push leaves the queue untouched.
    pub fn push(&mut self, entry: PendingRetune) -> TimingResult<()> {
        if self.entries.len() >= self.capacity {
            return Err(TimingError::QueueOverflow {
                capacity: self.capacity,
            });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Oldest pending request.
    pub fn front(&self) -> Option<&PendingRetune> {
        self.entries.front()
    }

    pub fn pop_front(&mut self) -> Option<PendingRetune> {
        self.entries.pop_front()
    }

    /// Fire every head entry due in the batch [start, start + len).
    ///
    /// Only the head is ever inspected: a later entry with an earlier target
    /// waits behind an earlier entry that is not yet due.
    pub fn drain_due(&mut self, start: u64, len: usize) -> Vec<(u64, PendingRetune)> {
        let mut due = Vec::new();
        while let Some(head) = self.entries.front() {
            match head.target.disposition(start, len) {
                Disposition::FireAt(offset) => {
                    if let Some(entry) = self.entries.pop_front() {
                        due.push((offset, entry));
                    }
                }
                Disposition::Wait => break,
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRetune> {
        self.entries.iter()
    }
}

impl Default for RetuneQueue {
    fn default() -> Self {
        Self::new()
    }
}
