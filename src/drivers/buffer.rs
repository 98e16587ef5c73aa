use std::collections::VecDeque;

pub const PREALLOCATE_LIMIT: usize = 1 << 20;

/// Fixed-capacity history of one channel. Overwrites the oldest sample once full.
#[derive(Clone, Debug)]
pub struct ChannelBuffer {
    data: VecDeque<f64>,
    capacity: usize,
}

impl ChannelBuffer {
    /// Storage beyond `PREALLOCATE_LIMIT` samples grows on demand.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn append(&mut self, value: f64) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
        debug_assert!(self.data.len() <= self.capacity);
    }

    pub fn append_many<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = f64>,
    {
        for value in values {
            self.append(value);
        }
    }

    /// The most recent `min(n, len)` samples, oldest first. Borrows, never copies.
    pub fn last(&self, n: usize) -> impl ExactSizeIterator<Item = f64> + DoubleEndedIterator + '_ {
        let start = self.data.len().saturating_sub(n);
        self.data.range(start..).copied()
    }

    pub fn latest(&self) -> Option<f64> {
        self.data.back().copied()
    }
}
