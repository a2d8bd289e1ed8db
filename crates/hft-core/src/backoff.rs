use std::hint;
use std::thread;

/// Adaptive backoff: spin with a PAUSE hint, then yield to the OS, then give
/// up. Used on the pool's contended free-list CAS and, with configurable
/// limits, as the capture/parser back-pressure discipline in §4.6.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
    spin_limit: u32,
    yield_limit: u32,
}

impl Backoff {
    const DEFAULT_SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding
    const DEFAULT_YIELD_LIMIT: u32 = 10; // then give up

    /// Creates a new backoff instance with the default limits.
    #[inline]
    pub fn new() -> Self {
        Self::with_limits(Self::DEFAULT_SPIN_LIMIT, Self::DEFAULT_YIELD_LIMIT)
    }

    /// Creates a backoff instance with explicit spin/yield limits, as
    /// configured by `OrchestratorConfig::backoff_spins` /
    /// `backoff_yield_after`.
    #[inline]
    pub fn with_limits(spin_limit: u32, yield_limit: u32) -> Self {
        Self {
            step: 0,
            spin_limit,
            yield_limit: yield_limit.max(spin_limit),
        }
    }

    /// Light spin with PAUSE hints.
    #[inline]
    pub fn spin(&mut self) {
        let spins = 1u32 << self.step.min(self.spin_limit);
        for _ in 0..spins {
            hint::spin_loop();
        }
        if self.step <= self.spin_limit {
            self.step += 1;
        }
    }

    /// Heavier backoff: spin until the spin budget is spent, then yield.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= self.spin_limit {
            self.spin();
        } else {
            thread::yield_now();
            if self.step <= self.yield_limit {
                self.step += 1;
            }
        }
    }

    /// Whether the backoff has exhausted its patience (caller should shed).
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step > self.yield_limit
    }

    /// Resets for the next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_progresses_and_completes() {
        let mut b = Backoff::new();
        assert_eq!(b.step, 0);

        b.spin();
        assert!(b.step > 0);

        while !b.is_completed() {
            b.snooze();
        }
        assert!(b.step > Backoff::DEFAULT_YIELD_LIMIT);

        b.reset();
        assert_eq!(b.step, 0);
    }

    #[test]
    fn custom_limits_complete_sooner() {
        let mut b = Backoff::with_limits(2, 3);
        let mut iterations = 0;
        while !b.is_completed() {
            b.snooze();
            iterations += 1;
            assert!(iterations < 1000, "backoff never completed");
        }
    }
}
