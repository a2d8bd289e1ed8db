//! Debug assertion macros for the pool and queue invariants.
//!
//! Runtime checks for the conservation, ownership, and ordering invariants
//! the pool and queue are supposed to uphold. Only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release
//! builds.
//!
//! Used by both `pool::Pool` and `queue::Queue`.

/// `allocated + free == num_blocks` at every observable moment.
macro_rules! debug_assert_pool_conserved {
    ($allocated:expr, $free:expr, $num_blocks:expr) => {
        debug_assert!(
            $allocated + $free == $num_blocks,
            "pool conservation violated: allocated {} + free {} != num_blocks {}",
            $allocated,
            $free,
            $num_blocks
        )
    };
}

/// A block must be `in_use == false` immediately before it is handed out.
macro_rules! debug_assert_not_in_use {
    ($in_use:expr, $index:expr) => {
        debug_assert!(
            !$in_use,
            "acquired block {} that was already marked in use",
            $index
        )
    };
}

/// A block must be `in_use == true` immediately before it is released.
/// Catches double-release.
macro_rules! debug_assert_was_in_use {
    ($in_use:expr, $index:expr) => {
        debug_assert!(
            $in_use,
            "released block {} that was not in use (double release)",
            $index
        )
    };
}

/// Producer/consumer cursors only ever move forward.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// `0 <= head - tail <= capacity` at every observable moment.
macro_rules! debug_assert_bounded_size {
    ($head:expr, $tail:expr, $capacity:expr) => {
        debug_assert!(
            $head >= $tail && $head - $tail <= $capacity,
            "queue size bound violated: head {} tail {} capacity {}",
            $head,
            $tail,
            $capacity
        )
    };
}

pub(crate) use debug_assert_bounded_size;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_not_in_use;
pub(crate) use debug_assert_pool_conserved;
pub(crate) use debug_assert_was_in_use;
