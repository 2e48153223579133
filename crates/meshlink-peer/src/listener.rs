use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use meshlink_frame::{Frame, FrameKind};

/// Receives frames dispatched by the decode thread.
///
/// Callbacks run on the decode thread, in wire order, and must not block
/// for long: the next frame is not read until every listener has returned.
pub trait FrameListener: Send + Sync {
    fn on_frame(&self, frame: &Frame);

    /// The connection closed. No more frames will arrive.
    fn on_close(&self) {}
}

impl<F> FrameListener for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn on_frame(&self, frame: &Frame) {
        self(frame)
    }
}

/// Which frames a listener wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    All,
    /// Frames of this kind, including kinds specialized from it.
    Kind(FrameKind),
}

impl Interest {
    pub fn matches(self, kind: FrameKind) -> bool {
        match self {
            Interest::All => true,
            Interest::Kind(interest) => kind.is_a(interest),
        }
    }
}

impl From<FrameKind> for Interest {
    fn from(kind: FrameKind) -> Self {
        Interest::Kind(kind)
    }
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    interest: Interest,
    listener: Arc<dyn FrameListener>,
}

/// Copy-on-write listener list.
///
/// Writers replace the whole list under the lock; dispatch clones the current
/// `Arc` and iterates it unlocked, so a listener may register or unregister
/// from inside a callback without deadlocking and without affecting the
/// dispatch in progress.
pub(crate) struct ListenerRegistry {
    entries: Mutex<Arc<Vec<Entry>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, interest: Interest, listener: Arc<dyn FrameListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.lock();
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push(Entry {
            id,
            interest,
            listener,
        });
        *entries = Arc::new(next);
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        if !entries.iter().any(|entry| entry.id == id) {
            return false;
        }
        let next: Vec<Entry> = entries
            .iter()
            .filter(|entry| entry.id != id)
            .cloned()
            .collect();
        *entries = Arc::new(next);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `frame` to every interested listener in registration order.
    pub(crate) fn dispatch(&self, frame: &Frame) {
        let snapshot = self.snapshot();
        let kind = frame.kind();
        for entry in snapshot.iter() {
            if entry.interest.matches(kind) {
                entry.listener.on_frame(frame);
            }
        }
    }

    pub(crate) fn close_all(&self) {
        for entry in self.snapshot().iter() {
            entry.listener.on_close();
        }
    }

    fn snapshot(&self) -> Arc<Vec<Entry>> {
        Arc::clone(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<Entry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
