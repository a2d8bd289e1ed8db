//! Lock-free bounded MPMC queue (C2).
//!
//! A direct implementation of the Vyukov bounded multi-producer/multi-
//! consumer ring: each slot carries a sequence number, producers commit
//! when `slot.seq == head`, consumers commit when `slot.seq == tail + 1`.
//! This differs from this crate's lineage, whose `Ring<T>` gives each
//! producer a dedicated SPSC ring to sidestep producer-producer contention
//! entirely — this queue wants true contention on one shared ring, so
//! slots (not per-producer rings) are the unit of synchronization here.
//! The cache-line alignment and bounded-backoff conventions are kept from
//! that lineage.

use crate::align::CacheAligned;
use crate::invariants::{debug_assert_bounded_size, debug_assert_monotonic};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

struct Slot<T> {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Read-only counters for the C7 metrics surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub capacity: usize,
    pub size: usize,
    pub enqueued_total: u64,
    pub dequeued_total: u64,
    pub failed_push_total: u64,
    pub failed_pop_total: u64,
}

/// Bounded multi-producer/multi-consumer ring of `capacity` slots.
/// `capacity` must be a power of two; construction panics otherwise as a
/// contract violation.
pub struct Queue<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    capacity: usize,
    head: CacheAligned<AtomicUsize>,
    tail: CacheAligned<AtomicUsize>,
    enqueued_total: AtomicU64,
    dequeued_total: AtomicU64,
    failed_push_total: AtomicU64,
    failed_pop_total: AtomicU64,
}

// SAFETY: slot ownership is handed off exclusively via the sequence-number
// protocol below; a `T: Send` may cross from producer thread to consumer
// thread.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Constructs a new queue.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two — non-power-of-two
    /// capacities are rejected at construction.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > 0 && capacity.is_power_of_two(),
            "queue capacity must be a nonzero power of two, got {capacity}"
        );

        let mut buffer = Vec::with_capacity(capacity);
        for i in 0..capacity {
            buffer.push(Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            });
        }

        Self {
            buffer: buffer.into_boxed_slice(),
            mask: capacity - 1,
            capacity,
            head: CacheAligned::new(AtomicUsize::new(0)),
            tail: CacheAligned::new(AtomicUsize::new(0)),
            enqueued_total: AtomicU64::new(0),
            dequeued_total: AtomicU64::new(0),
            failed_push_total: AtomicU64::new(0),
            failed_pop_total: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Observational, may be stale under contention.
    pub fn size(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Fill ratio used for the shed-mode hysteresis.
    pub fn fill_ratio(&self) -> f64 {
        self.size() as f64 / self.capacity as f64
    }

    /// Enqueues without blocking. Returns `Ok(())` on success; on failure
    /// (queue full) hands the item back in `Err` so callers holding a
    /// non-droppable payload (e.g. a pool [`crate::pool::BlockHandle`])
    /// can shed or retry it explicitly rather than losing it silently.
    /// `.is_ok()` gives the equivalent boolean push result.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[head & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - head as isize;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: we own this slot exclusively until the
                        // seq store below publishes it to consumers.
                        unsafe {
                            (*slot.value.get()).write(item);
                        }
                        let new_head = head.wrapping_add(1);
                        debug_assert_monotonic!("queue head", head, new_head);
                        slot.seq.store(new_head, Ordering::Release);
                        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
                        debug_assert_bounded_size!(
                            new_head,
                            self.tail.load(Ordering::Relaxed),
                            self.capacity
                        );
                        return Ok(());
                    }
                    Err(actual) => head = actual,
                }
            } else if diff < 0 {
                self.failed_push_total.fetch_add(1, Ordering::Relaxed);
                return Err(item);
            } else {
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeues without blocking. Returns `None` iff the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[tail & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - (tail as isize + 1);

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: seq == tail+1 means the producer's
                        // Release store happened-before this Acquire load,
                        // so the value is fully initialized.
                        let item = unsafe { (*slot.value.get()).assume_init_read() };
                        let new_tail = tail.wrapping_add(1);
                        debug_assert_monotonic!("queue tail", tail, new_tail);
                        slot.seq
                            .store(tail.wrapping_add(self.capacity), Ordering::Release);
                        self.dequeued_total.fetch_add(1, Ordering::Relaxed);
                        debug_assert_bounded_size!(
                            self.head.load(Ordering::Relaxed),
                            new_tail,
                            self.capacity
                        );
                        return Some(item);
                    }
                    Err(actual) => tail = actual,
                }
            } else if diff < 0 {
                self.failed_pop_total.fetch_add(1, Ordering::Relaxed);
                return None;
            } else {
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.capacity,
            size: self.size(),
            enqueued_total: self.enqueued_total.load(Ordering::Relaxed),
            dequeued_total: self.dequeued_total.load(Ordering::Relaxed),
            failed_push_total: self.failed_push_total.load(Ordering::Relaxed),
            failed_pop_total: self.failed_pop_total.load(Ordering::Relaxed),
        }
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        // Drop any items still logically in [tail, head).
        while self.try_pop().is_some() {}
    }
}
