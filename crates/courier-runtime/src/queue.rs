//! The outbound message queue the bridge drains.
//!
//! A [`Queue`] is a FIFO of raw JSON entries with a push notification. The
//! production store lives outside this process; [`MemoryQueue`] is the
//! in-process implementation used by tests and the demo relay.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{QueueError, QueueResult};

/// A shared FIFO queue with push notification.
///
/// `wait` must not lose a notification for a push that happened after the
/// last `pop` returned `None`: a consumer that drains and then waits sees
/// every entry.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Appends an entry.
    async fn push(&self, entry: String) -> QueueResult<()>;

    /// Removes the oldest entry, or returns `None` when empty.
    async fn pop(&self) -> QueueResult<Option<String>>;

    /// Resolves once an entry may be available. Returns
    /// [`QueueError::Closed`] once the queue is closed and empty.
    async fn wait(&self) -> QueueResult<()>;
}

/// Shared, type-erased queue.
pub type BoxedQueue = Arc<dyn Queue>;

/// An in-memory [`Queue`].
#[derive(Debug, Default)]
pub struct MemoryQueue {
    entries: Mutex<VecDeque<String>>,
    notify: Notify,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries waiting.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Closes the queue. Entries already pushed can still be popped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn push(&self, entry: String) -> QueueResult<()> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        self.entries.lock().push_back(entry);
        // Stores a permit when nobody is waiting yet.
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> QueueResult<Option<String>> {
        Ok(self.entries.lock().pop_front())
    }

    async fn wait(&self) -> QueueResult<()> {
        if !self.is_empty() {
            return Ok(());
        }
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        self.notify.notified().await;
        if self.is_closed() && self.is_empty() {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}
