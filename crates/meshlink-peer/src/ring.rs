use std::collections::VecDeque;

/// Bounded byte queue that overwrites its oldest bytes when full.
#[derive(Debug)]
pub(crate) struct RingBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl RingBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `data`, returning how many unread bytes were dropped to make
    /// room.
    pub(crate) fn push(&mut self, data: &[u8]) -> usize {
        // Only the newest `capacity` bytes of `data` can survive.
        let skipped = data.len().saturating_sub(self.capacity);
        let data = &data[skipped..];
        let overflow = (self.bytes.len() + data.len()).saturating_sub(self.capacity);
        self.bytes.drain(..overflow);
        self.bytes.extend(data);
        skipped + overflow
    }

    /// Move up to `buf.len()` bytes out. Returns the count moved.
    pub(crate) fn pop_into(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.bytes.len());
        for (dst, src) in buf.iter_mut().zip(self.bytes.drain(..count)) {
            *dst = src;
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
