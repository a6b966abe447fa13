use std::fmt;

use crate::event::Event;

/// Identity of a delivery worker. Workers are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

/// Events accumulated by one worker between two flushes.
///
/// A batch is delivered as a whole or not at all, and is never merged with
/// or split into other batches.
#[derive(Debug)]
pub struct Batch {
    worker: WorkerId,
    sequence: u64,
    events: Vec<Event>,
}

impl Batch {
    pub fn new(worker: WorkerId, sequence: u64, capacity: usize) -> Self {
        Self {
            worker,
            sequence,
            events: Vec::with_capacity(capacity),
        }
    }

    /// The worker that drained this batch.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Position of this batch among the worker's flushes, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub(crate) fn events_mut(&mut self) -> &mut Vec<Event> {
        &mut self.events
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_is_zero_padded() {
        assert_eq!(WorkerId(3).to_string(), "03");
        assert_eq!(WorkerId(16).to_string(), "16");
    }
}
