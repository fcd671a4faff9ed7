use super::Batch;
use crate::domain::{LogEvent, MAX_BATCH_COUNT, MAX_BATCH_SIZE};
use std::collections::VecDeque;

/// Bounded holding area for events awaiting upload.
///
/// The byte total never exceeds `max_bytes` after a mutation. When it would,
/// the oldest events are evicted first. The queue is owned by a single flow
/// scheduler and needs no locking.
#[derive(Debug)]
pub struct EventQueue {
    max_bytes: usize,
    pending: VecDeque<LogEvent>,
    pending_bytes: usize,
}

impl EventQueue {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            pending: VecDeque::new(),
            pending_bytes: 0,
        }
    }

    /// Appends events at the tail and returns how many old events were evicted.
    pub fn add<I>(&mut self, events: I) -> usize
    where
        I: IntoIterator<Item = LogEvent>,
    {
        for event in events {
            self.pending_bytes += event.size();
            self.pending.push_back(event);
        }
        self.enforce_bound()
    }

    /// Puts a batch back at the head so it leads the next `get_batch`.
    ///
    /// Returns how many events were evicted to stay within the bound.
    pub fn requeue(&mut self, batch: Batch) -> usize {
        for event in batch.into_events().into_iter().rev() {
            self.pending_bytes += event.size();
            self.pending.push_front(event);
        }
        self.enforce_bound()
    }

    /// Removes the longest prefix that fits in one `PutLogEvents` call.
    pub fn get_batch(&mut self) -> Batch {
        let mut bytes = 0;
        let mut count = 0;
        for event in &self.pending {
            let size = event.size();
            if count == MAX_BATCH_COUNT || bytes + size > MAX_BATCH_SIZE {
                break;
            }
            bytes += size;
            count += 1;
        }

        self.pending_bytes -= bytes;
        Batch::new(self.pending.drain(..count).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn enforce_bound(&mut self) -> usize {
        let mut evicted = 0;
        while self.pending_bytes > self.max_bytes {
            let Some(oldest) = self.pending.pop_front() else {
                break;
            };
            self.pending_bytes -= oldest.size();
            evicted += 1;
        }
        evicted
    }
}
