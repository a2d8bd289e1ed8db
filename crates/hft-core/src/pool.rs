//! Fixed-block memory pool (C1).
//!
//! A contiguous arena of `num_blocks` equal-size blocks, handed out in O(1)
//! via a Treiber-stack free list: the head is a single `AtomicU64` packing a
//! generation counter (upper 32 bits) and a block index (lower 32 bits), so
//! a CAS loop on the head is immune to ABA even though indices get reused
//! constantly. Chosen over a per-thread-cache design because capture and
//! consumer threads are distinct and contention on the free list is
//! non-trivial.

use crate::align::CacheAligned;
use crate::error::PipelineError;
use crate::invariants::{debug_assert_not_in_use, debug_assert_pool_conserved, debug_assert_was_in_use};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

const EMPTY: u32 = u32::MAX;
const INDEX_BITS: u32 = 32;

#[inline]
fn pack(generation: u32, index: u32) -> u64 {
    ((generation as u64) << INDEX_BITS) | (index as u64)
}

#[inline]
fn unpack_generation(tagged: u64) -> u32 {
    (tagged >> INDEX_BITS) as u32
}

#[inline]
fn unpack_index(tagged: u64) -> u32 {
    (tagged & u32::MAX as u64) as u32
}

struct Descriptor {
    /// Next free index in the free list, or `EMPTY`. Only ever touched
    /// while the owning block is off the free list's active head, so a
    /// plain atomic (not a CAS target itself) suffices.
    next: AtomicU32,
    in_use: AtomicBool,
}

/// An exclusive reference to one block in a [`Pool`]. Carries its own
/// pointer and length so release is O(1) with no side table — an index
/// carried in the handle itself, rather than an identity-keyed lookup.
///
/// `BlockHandle` is intentionally not RAII: the external contract requires
/// an explicit `release` call exactly once per handle, with a missed
/// release a leak and a double release a bug, so forgetting one leaks
/// rather than silently auto-releasing on drop.
#[derive(Debug, Clone, Copy)]
pub struct BlockHandle {
    index: u32,
    ptr: *mut u8,
    len: usize,
}

impl BlockHandle {
    /// Index of this block within its pool's descriptor array.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Length of the block's storage region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Borrows the block's storage immutably.
    ///
    /// # Safety
    /// The caller must hold exclusive ownership of this handle (i.e. it was
    /// returned by `acquire` and not yet `release`d), and no other alias to
    /// the same block may be read or written concurrently.
    #[inline]
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }

    /// Borrows the block's storage mutably.
    ///
    /// # Safety
    /// Same requirements as [`BlockHandle::as_slice`].
    #[inline]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }
}

// SAFETY: a BlockHandle is only ever resolvable by the single holder that
// acquired it; moving that ownership across a thread boundary is sound.
unsafe impl Send for BlockHandle {}

/// Read-only snapshot of pool counters (C7 metrics surface input).
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub num_blocks: usize,
    pub block_size: usize,
    pub allocated: usize,
    pub free: usize,
    pub acquired_total: u64,
    pub released_total: u64,
    pub exhausted_total: u64,
    pub double_release_total: u64,
}

/// Fixed-block arena. See module docs for the free-list discipline.
pub struct Pool {
    arena: UnsafeCell<Box<[u8]>>,
    descriptors: Box<[Descriptor]>,
    free_head: CacheAligned<AtomicU64>,
    block_size: usize,
    num_blocks: usize,
    allocated: AtomicUsize,
    acquired_total: AtomicU64,
    released_total: AtomicU64,
    exhausted_total: AtomicU64,
    double_release_total: AtomicU64,
}

// SAFETY: all mutable access to `arena` goes through the disjoint
// block regions addressed by `BlockHandle`s that the free-list protocol
// guarantees are exclusively held; the free list and descriptor array are
// themselves synchronized via atomics.
unsafe impl Sync for Pool {}
unsafe impl Send for Pool {}

impl Pool {
    /// Constructs a pool from [`crate::config::PoolConfig`].
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] if `block_bytes` is zero or
    /// does not evenly divide `pool_bytes`, or if the derived block count is
    /// zero. Returns [`PipelineError::ArenaReservationFailed`] if the arena
    /// allocation itself cannot be satisfied. These are checked at startup
    /// because arena layout cannot change afterward and construction
    /// failure is treated as fatal.
    pub fn new(config: crate::config::PoolConfig) -> Result<Self, PipelineError> {
        if config.block_bytes == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "block_bytes must be nonzero".into(),
            });
        }
        if config.pool_bytes % config.block_bytes != 0 {
            return Err(PipelineError::InvalidConfig {
                reason: format!(
                    "pool_bytes ({}) must be a multiple of block_bytes ({})",
                    config.pool_bytes, config.block_bytes
                ),
            });
        }
        let num_blocks = config.pool_bytes / config.block_bytes;
        if num_blocks == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "pool_bytes / block_bytes must be at least 1".into(),
            });
        }

        let mut arena_vec: Vec<u8> = Vec::new();
        arena_vec
            .try_reserve_exact(config.pool_bytes)
            .map_err(|_| PipelineError::ArenaReservationFailed {
                pool_bytes: config.pool_bytes,
            })?;
        arena_vec.resize(config.pool_bytes, 0u8);
        let arena = arena_vec.into_boxed_slice();

        let mut descriptors = Vec::with_capacity(num_blocks);
        for i in 0..num_blocks {
            let next = if i + 1 < num_blocks { i as u32 + 1 } else { EMPTY };
            descriptors.push(Descriptor {
                next: AtomicU32::new(next),
                in_use: AtomicBool::new(false),
            });
        }

        let pool = Self {
            arena: UnsafeCell::new(arena),
            descriptors: descriptors.into_boxed_slice(),
            free_head: CacheAligned::new(AtomicU64::new(pack(0, 0))),
            block_size: config.block_bytes,
            num_blocks,
            allocated: AtomicUsize::new(0),
            acquired_total: AtomicU64::new(0),
            released_total: AtomicU64::new(0),
            exhausted_total: AtomicU64::new(0),
            double_release_total: AtomicU64::new(0),
        };

        if config.use_mapped_arena {
            pool.prefault();
        }

        Ok(pool)
    }

    /// Touches every page of the arena once to fault it out of demand
    /// paging ahead of the hot path.
    pub fn prefault(&self) {
        const PAGE: usize = 4096;
        // SAFETY: exclusive access during construction/startup; no blocks
        // are outstanding yet, so writing zero (the value already there)
        // cannot race with a reader.
        let arena = unsafe { &mut *self.arena.get() };
        let mut offset = 0;
        while offset < arena.len() {
            // SAFETY: offset < arena.len() by the loop condition.
            unsafe {
                std::ptr::write_volatile(arena.as_mut_ptr().add(offset), 0u8);
            }
            offset += PAGE;
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_blocks
    }

    fn block_ptr(&self, index: u32) -> *mut u8 {
        // SAFETY: base pointer is stable for the arena's lifetime (the
        // Box's heap allocation never moves); index is always < num_blocks.
        let arena = unsafe { &mut *self.arena.get() };
        unsafe { arena.as_mut_ptr().add(index as usize * self.block_size) }
    }

    /// Acquires one free block in O(1), or `None` if the pool is exhausted.
    /// Exhaustion is expected and non-fatal.
    pub fn acquire(&self) -> Option<BlockHandle> {
        let mut backoff = crate::backoff::Backoff::new();
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            let index = unpack_index(head);
            if index == EMPTY {
                self.exhausted_total.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("pool exhausted: capacity {}", self.num_blocks);
                return None;
            }

            let descriptor = &self.descriptors[index as usize];
            let next = descriptor.next.load(Ordering::Relaxed);
            let generation = unpack_generation(head).wrapping_add(1);
            let new_head = pack(generation, next);

            if self
                .free_head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                debug_assert_not_in_use!(descriptor.in_use.load(Ordering::Relaxed), index);
                descriptor.in_use.store(true, Ordering::Release);
                let allocated = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
                debug_assert_pool_conserved!(allocated, self.num_blocks - allocated, self.num_blocks);
                self.acquired_total.fetch_add(1, Ordering::Relaxed);

                return Some(BlockHandle {
                    index,
                    ptr: self.block_ptr(index),
                    len: self.block_size,
                });
            }

            backoff.snooze();
        }
    }

    /// Returns a block to the pool in O(1). Zeroes the block's bytes first
    /// since the arena may be reused across trust domains.
    ///
    /// Releasing a handle twice is a contract violation: debug builds
    /// assert, release builds detect it via the `in_use` flag and no-op
    /// rather than corrupting the free list.
    pub fn release(&self, handle: BlockHandle) {
        let descriptor = &self.descriptors[handle.index as usize];

        debug_assert_was_in_use!(descriptor.in_use.load(Ordering::Relaxed), handle.index);

        // Release-build double-release guard: only proceed if we observe
        // (and clear) `in_use == true` ourselves.
        if descriptor
            .in_use
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.double_release_total.fetch_add(1, Ordering::Relaxed);
            tracing::error!(index = handle.index, "double release of pool block detected");
            return;
        }

        // SAFETY: handle.len == block_size and handle.ptr points at this
        // block's region; we hold it exclusively until this point.
        unsafe {
            std::ptr::write_bytes(handle.ptr, 0, handle.len);
        }

        let mut backoff = crate::backoff::Backoff::new();
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            descriptor.next.store(unpack_index(head), Ordering::Relaxed);
            let generation = unpack_generation(head).wrapping_add(1);
            let new_head = pack(generation, handle.index);

            if self
                .free_head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
            backoff.snooze();
        }

        let allocated = self.allocated.fetch_sub(1, Ordering::Relaxed) - 1;
        debug_assert_pool_conserved!(allocated, self.num_blocks - allocated, self.num_blocks);
        self.released_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PoolStats {
        let allocated = self.allocated.load(Ordering::Relaxed);
        PoolStats {
            num_blocks: self.num_blocks,
            block_size: self.block_size,
            allocated,
            free: self.num_blocks - allocated,
            acquired_total: self.acquired_total.load(Ordering::Relaxed),
            released_total: self.released_total.load(Ordering::Relaxed),
            exhausted_total: self.exhausted_total.load(Ordering::Relaxed),
            double_release_total: self.double_release_total.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    fn small_pool(num_blocks: usize, block_bytes: usize) -> Pool {
        Pool::new(PoolConfig {
            pool_bytes: num_blocks * block_bytes,
            block_bytes,
            use_mapped_arena: false,
        })
        .unwrap()
    }

    #[test]
    fn acquire_release_round_trip() {
        let pool = small_pool(4, 64);
        let h = pool.acquire().unwrap();
        assert_eq!(pool.stats().allocated, 1);
        pool.release(h);
        assert_eq!(pool.stats().allocated, 0);
    }

    #[test]
    fn exhaustion_then_recovery() {
        let pool = small_pool(4, 64);
        let handles: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
        assert!(pool.acquire().is_none());
        let stats = pool.stats();
        assert_eq!(stats.allocated, 4);
        assert_eq!(stats.free, 0);

        for h in handles {
            pool.release(h);
        }
        let stats = pool.stats();
        assert_eq!(stats.allocated, 0);
        assert_eq!(stats.free, 4);
    }

    #[test]
    fn handles_never_alias() {
        let pool = small_pool(8, 64);
        let handles: Vec<_> = (0..8).map(|_| pool.acquire().unwrap()).collect();
        let mut indices: Vec<_> = handles.iter().map(BlockHandle::index).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 8);
        for h in handles {
            pool.release(h);
        }
    }

    #[test]
    fn handle_addresses_are_block_aligned_and_in_range() {
        let pool = small_pool(4, 128);
        let arena_base = pool.block_ptr(0) as usize;
        for _ in 0..4 {
            let h = pool.acquire().unwrap();
            let addr = h.ptr as usize;
            assert!(addr >= arena_base && addr < arena_base + 4 * 128);
            assert_eq!((addr - arena_base) % 128, 0);
        }
    }

    #[test]
    fn release_zeroes_block() {
        let pool = small_pool(2, 32);
        let h = pool.acquire().unwrap();
        unsafe {
            h.as_mut_slice().fill(0xAB);
        }
        pool.release(h);
        let h2 = pool.acquire().unwrap();
        unsafe {
            assert!(h2.as_slice().iter().all(|&b| b == 0));
        }
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn double_release_is_detected_not_corrupting() {
        let pool = small_pool(2, 32);
        let h = pool.acquire().unwrap();
        pool.release(h);
        pool.release(h); // double release, release-build path
        assert_eq!(pool.stats().double_release_total, 1);
        // Free list must still be consistent: capacity blocks acquirable.
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        pool.release(a);
        pool.release(b);
    }
}
