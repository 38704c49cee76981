use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A fixed-capacity ring that evicts its oldest value when full.
///
/// Clones share the same storage, so a ring can be handed to several
/// threads. `push` and `drain` both take the lock, which makes them
/// linearizable with respect to each other.
#[derive(Debug)]
pub struct BoundedRing<T> {
    slots: Arc<Mutex<VecDeque<T>>>,
    capacity: usize,
    evicted_count: Arc<AtomicU64>,
}

impl<T> Clone for BoundedRing<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            capacity: self.capacity,
            evicted_count: Arc::clone(&self.evicted_count),
        }
    }
}

impl<T> BoundedRing<T> {
    /// Create a new ring with the specified capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            slots: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            evicted_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Insert a value as the newest element, discarding the oldest one if the
    /// ring is already full
    pub fn push(&self, item: T) {
        let mut slots = self.slots.lock();
        if slots.len() == self.capacity {
            slots.pop_front();
            self.evicted_count.fetch_add(1, Ordering::Relaxed);
        }
        slots.push_back(item);
    }

    /// Take every buffered value, oldest first, and leave the ring empty.
    ///
    /// Returns `None` when there was nothing to take, never an empty vector.
    pub fn drain(&self) -> Option<Vec<T>> {
        let mut slots = self.slots.lock();
        if slots.is_empty() {
            return None;
        }
        let taken = std::mem::replace(&mut *slots, VecDeque::with_capacity(self.capacity));
        Some(Vec::from(taken))
    }

    /// Get the number of buffered values
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Get the capacity of the ring
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of values discarded by overflow
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count.load(Ordering::Relaxed)
    }
}
