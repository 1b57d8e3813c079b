//! Bounded FIFO queue shared between the link tasks.
//!
//! Storage is a lock-free `crossbeam_queue::ArrayQueue`; two `tokio::sync::Notify`
//! handles let consumers wait for data and producers wait for room without polling.
//!
//! ```text
//!  producers ──push()──▶ [ ArrayQueue (capacity N) ] ──pop()──▶ consumer
//!      ▲                                                   │
//!      └────────────── not_full.notify_one() ◀─────────────┘
//! ```
//!
//! When the queue is full a push either waits ([`OverflowPolicy::Block`]), evicts the
//! oldest entry ([`OverflowPolicy::DropOldest`]) or gives up on the new one
//! ([`OverflowPolicy::DropNewest`]).

use crate::config::OverflowPolicy;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Fixed-capacity multi-producer queue with async waits on both ends.
pub struct BoundedQueue<T> {
    items: ArrayQueue<T>,
    not_empty: Notify,
    not_full: Notify,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            items: ArrayQueue::new(capacity.max(1)),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    /// Number of items discarded by drop-oldest and drop-newest pushes so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Push without waiting; hands the item back when the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.items.push(item)?;
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push, evicting the oldest item if the queue is full.
    ///
    /// Returns the evicted item, if any.
    pub fn push_evicting(&self, item: T) -> Option<T> {
        let evicted = self.items.force_push(item);
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.not_empty.notify_one();
        evicted
    }

    /// Push, waiting for room while the queue is full.
    pub async fn push_wait(&self, item: T) {
        let mut item = item;
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(item) {
                Ok(()) => return,
                Err(rejected) => {
                    item = rejected;
                    notified.await;
                }
            }
        }
    }

    /// Push according to `policy`. Returns the item that was discarded, if any.
    pub async fn push(&self, item: T, policy: OverflowPolicy) -> Option<T> {
        match policy {
            OverflowPolicy::Block => {
                self.push_wait(item).await;
                None
            }
            OverflowPolicy::DropOldest => self.push_evicting(item),
            OverflowPolicy::DropNewest => {
                let rejected = self.try_push(item).err();
                if rejected.is_some() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                rejected
            }
        }
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.items.pop();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Pop, waiting while the queue is empty.
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return item;
            }
            notified.await;
        }
    }
}
