//! Size-bounded accumulator for the batch of the current cycle.
//!
//! Holds events in insertion order until the cycle either hands them to the
//! sink ([`BatchAccumulator::take`]) or drops them after a failure
//! ([`BatchAccumulator::discard`]).

/// Upper bound on the up-front allocation; larger batches grow on demand.
const MAX_PREALLOC: usize = 4096;

/// The open batch of one polling cycle.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    buffer: Vec<T>,
    max_size: usize,
}

impl<T> BatchAccumulator<T> {
    /// Create an accumulator holding at most `max_size` items.
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_size.min(MAX_PREALLOC)),
            max_size,
        }
    }

    /// Append an item. The caller checks [`is_full`](Self::is_full) first.
    pub fn push(&mut self, item: T) {
        debug_assert!(!self.is_full(), "push into a full batch");
        self.buffer.push(item);
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.max_size
    }

    /// Move the batch out, leaving the accumulator empty.
    pub fn take(&mut self) -> Vec<T> {
        let capacity = self.max_size.min(MAX_PREALLOC);
        std::mem::replace(&mut self.buffer, Vec::with_capacity(capacity))
    }

    /// Drop the batch, returning how many items were lost.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
