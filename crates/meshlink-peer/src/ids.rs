use std::sync::atomic::{AtomicU8, Ordering};

/// Hands out frame ids for requests that expect a response.
///
/// Ids run 1..=255 and wrap back to 1; 0 is reserved for frames that must
/// not be acknowledged.
#[derive(Debug, Default)]
pub struct FrameIdAllocator {
    last: AtomicU8,
}

impl FrameIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id in sequence.
    pub fn next_id(&self) -> u8 {
        let previous = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| Some(successor(id)))
        {
            Ok(id) | Err(id) => id,
        };
        successor(previous)
    }
}

fn successor(id: u8) -> u8 {
    id.wrapping_add(1).max(1)
}
