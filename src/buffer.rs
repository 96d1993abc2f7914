//! Fixed capacity FIFO ring that hands requests from the input thread to the
//! dispatcher. Producers block while it is full, consumers while it is empty.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

/// capacity used when nothing else is configured
pub const DEFAULT_CAPACITY: usize = 4;

#[derive(Debug)]
struct Ring<T> {
    slots: VecDeque<(usize, T)>,
    write: usize,
    read: usize,
}

#[derive(Debug)]
pub struct BoundedQueue<T> {
    capacity: usize,
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// # Panics
    /// if `capacity` is 0, such a queue could never accept an item
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        Self {
            capacity,
            ring: Mutex::new(Ring {
                slots: VecDeque::with_capacity(capacity),
                write: 0,
                read: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks while the queue is full, returns the slot index the item was
    /// written to.
    pub fn enqueue(&self, item: T) -> usize {
        let mut ring = self
            .not_full
            .wait_while(self.lock(), |ring| ring.slots.len() == self.capacity)
            .unwrap_or_else(PoisonError::into_inner);
        let slot = ring.write;
        ring.slots.push_back((slot, item));
        ring.write = (slot + 1) % self.capacity;
        drop(ring);
        self.not_empty.notify_one();
        slot
    }

    /// Blocks while the queue is empty, returns the oldest item and the slot
    /// index it was read from.
    pub fn dequeue(&self) -> (T, usize) {
        let mut ring = self
            .not_empty
            .wait_while(self.lock(), |ring| ring.slots.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let Some((slot, item)) = ring.slots.pop_front() else {
            unreachable!("woken with an empty ring")
        };
        debug_assert_eq!(slot, ring.read);
        ring.read = (slot + 1) % self.capacity;
        drop(ring);
        self.not_full.notify_one();
        (item, slot)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
