use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use meshlink_frame::Frame;

/// Recent id-bearing frames in both directions.
///
/// A response can arrive before its caller starts waiting for it. Waiters
/// scan the received list after registering, and ignore anything received
/// before their request went out: frame ids wrap, so an old response may
/// carry the same id.
pub(crate) struct ResponseHistory {
    depth: usize,
    received: Mutex<VecDeque<(Instant, Frame)>>,
    sent: Mutex<[Option<Instant>; 256]>,
}

impl ResponseHistory {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            depth,
            received: Mutex::new(VecDeque::with_capacity(depth)),
            sent: Mutex::new([None; 256]),
        }
    }

    pub(crate) fn record_sent(&self, frame: &Frame) {
        if let Some(id) = frame.frame_id().filter(|&id| id != 0) {
            lock(&self.sent)[id as usize] = Some(Instant::now());
        }
    }

    pub(crate) fn record_received(&self, frame: &Frame) {
        if self.depth == 0 || frame.frame_id().is_none_or(|id| id == 0) {
            return;
        }
        let mut received = lock(&self.received);
        while received.len() >= self.depth {
            received.pop_front();
        }
        received.push_back((Instant::now(), frame.clone()));
    }

    /// Frames received after `request` was sent that answer it, oldest first.
    pub(crate) fn responses_to(&self, request: &Frame) -> Vec<Frame> {
        let Some(id) = request.frame_id().filter(|&id| id != 0) else {
            return Vec::new();
        };
        let Some(sent_at) = lock(&self.sent)[id as usize] else {
            return Vec::new();
        };
        lock(&self.received)
            .iter()
            .filter(|(received_at, frame)| {
                *received_at >= sent_at && frame.is_response_for(request)
            })
            .map(|(_, frame)| frame.clone())
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
