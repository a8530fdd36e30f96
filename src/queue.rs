//! Bounded FIFO between a realtime producer and one async consumer
//!
//! Audio callbacks must never block, so producers push synchronously and
//! overflow drops the oldest item. Stale realtime audio is worthless; a
//! late frame is better discarded than delivered.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// Drop-oldest bounded queue with a single async consumer
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an item, evicting the oldest when full.
    ///
    /// Returns false if the queue was closed (the item is discarded).
    /// Safe to call from a realtime callback; never blocks on the
    /// consumer.
    pub fn push(&self, item: T) -> bool {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.closed {
                return false;
            }
            if inner.items.len() == self.capacity {
                inner.items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            inner.items.push_back(item);
        }
        self.notify.notify_one();
        true
    }

    /// Pop the next item, waiting until one arrives.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Pop the next item if one is immediately available
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).items.pop_front()
    }

    /// Close the queue; pending items remain poppable
    pub fn close(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
        self.notify.notify_one();
    }

    /// Discard all pending items
    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).items.clear();
    }

    /// Number of items waiting
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).items.len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items evicted by overflow so far
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let q = BoundedQueue::new(4);
        q.push(1);
        q.push(2);
        q.push(3);

        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let q = BoundedQueue::new(2);
        q.push(1);
        q.push(2);
        q.push(3);

        assert_eq!(q.dropped(), 1);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
    }

    #[test]
    fn test_push_after_close_is_rejected() {
        let q = BoundedQueue::new(2);
        q.push(1);
        q.close();

        assert!(!q.push(2));
        assert_eq!(q.try_pop(), Some(1));
    }

    #[tokio::test]
    async fn test_pop_returns_none_when_closed_and_drained() {
        let q = BoundedQueue::new(2);
        q.push(7);
        q.close();

        assert_eq!(q.pop().await, Some(7));
        assert_eq!(q.pop().await, None);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let q = std::sync::Arc::new(BoundedQueue::new(2));
        let q2 = std::sync::Arc::clone(&q);

        let waiter = tokio::spawn(async move { q2.pop().await });
        tokio::task::yield_now().await;
        q.push(42);

        assert_eq!(waiter.await.unwrap(), Some(42));
    }
}
