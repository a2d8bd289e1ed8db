//! Latency tracker (C4).
//!
//! A rolling window of the most recent `max_samples` latencies, plus
//! separately-accumulated lifetime statistics that are never evicted.
//! Single-writer/many-reader: only the owning thread calls `record`;
//! `stats()` may observe a torn snapshot under concurrent `record` calls.
//!
//! Each exchange can have its own violation target; callers resolve it
//! via the registry and pass it into `record`/`record_from_timestamps`,
//! where it is both applied to that sample and tracked per exchange so
//! `stats_by_exchange` reports the right target and violation rate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

const MAX_LATENCY_NS: u64 = u32::MAX as u64;

/// One recorded latency observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    pub capture_ts_ns: u64,
    pub latency_ns: u32,
    pub exchange_id: u32,
    pub protocol_tag: crate::parser::L4Protocol,
}

/// Full statistics block returned by `stats()` / `stats_by_exchange()`.
#[derive(Debug, Clone, Copy)]
pub struct LatencyStats {
    pub count: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub stddev_ns: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub p999_us: f64,
    pub target_us: u32,
    pub violation_rate: f64,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            count: 0,
            min_ns: 0,
            max_ns: 0,
            mean_ns: 0.0,
            stddev_ns: 0.0,
            p50_us: 0.0,
            p95_us: 0.0,
            p99_us: 0.0,
            p999_us: 0.0,
            target_us: 0,
            violation_rate: 0.0,
        }
    }
}

struct Lifetime {
    count: AtomicU64,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
    sum_ns: AtomicU64,
    // Sum of squares, used for the running standard deviation. Guarded
    // by the same single-writer discipline as the ring.
    sum_sq_ns: Mutex<f64>,
    violations: AtomicU64,
    bad_samples: AtomicU64,
    target_us: AtomicU32,
}

impl Lifetime {
    fn new(target_us: u32) -> Self {
        Self {
            count: AtomicU64::new(0),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
            sum_ns: AtomicU64::new(0),
            sum_sq_ns: Mutex::new(0.0),
            violations: AtomicU64::new(0),
            bad_samples: AtomicU64::new(0),
            target_us: AtomicU32::new(target_us),
        }
    }

    /// `target_us` is the threshold this particular sample is judged
    /// against (the exchange's own target, resolved by the caller via the
    /// registry); stored back so `stats()`/`stats_by_exchange()` can report
    /// the target alongside the violation rate it produced.
    fn record(&self, latency_ns: u32, target_us: u32) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ns.fetch_add(u64::from(latency_ns), Ordering::Relaxed);
        fetch_min(&self.min_ns, u64::from(latency_ns));
        fetch_max(&self.max_ns, u64::from(latency_ns));
        *self.sum_sq_ns.lock().unwrap() += f64::from(latency_ns) * f64::from(latency_ns);
        self.target_us.store(target_us, Ordering::Relaxed);

        let target_ns = u64::from(target_us) * 1000;
        if u64::from(latency_ns) > target_ns {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn fetch_max(slot: &AtomicU64, value: u64) {
    let mut current = slot.load(Ordering::Relaxed);
    while value > current {
        match slot.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

fn fetch_min(slot: &AtomicU64, value: u64) {
    let mut current = slot.load(Ordering::Relaxed);
    while value < current {
        match slot.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

/// Rolling-window latency tracker. One instance covers the whole engine;
/// the rolling window itself is shared across exchanges, but lifetime
/// count/min/max/mean/σ/violations are kept per exchange as well as
/// engine-wide, so `stats_by_exchange` can report a target and violation
/// rate scoped to that exchange.
pub struct LatencyTracker {
    ring: Mutex<Ring>,
    lifetime: Lifetime,
    per_exchange: Mutex<HashMap<u32, Lifetime>>,
    default_target_us: u32,
    window_size: usize,
}

struct Ring {
    samples: Vec<LatencySample>,
    next: usize,
}

impl LatencyTracker {
    pub fn new(config: crate::config::LatencyConfig) -> Self {
        Self {
            ring: Mutex::new(Ring {
                samples: Vec::with_capacity(config.window_size),
                next: 0,
            }),
            lifetime: Lifetime::new(config.default_target_us),
            per_exchange: Mutex::new(HashMap::new()),
            default_target_us: config.default_target_us,
            window_size: config.window_size,
        }
    }

    /// Records a pre-computed latency. `latency_ns` values above
    /// `u32::MAX` are clamped. `target_us` is the violation threshold for
    /// `exchange_id`, resolved by the caller (typically via
    /// [`crate::registry::ExchangeRegistry::latency_target_us`], falling
    /// back to the tracker's configured default for unregistered
    /// exchanges).
    pub fn record(
        &self,
        latency_ns: u64,
        exchange_id: u32,
        protocol_tag: crate::parser::L4Protocol,
        target_us: u32,
    ) {
        let clamped = latency_ns.min(MAX_LATENCY_NS) as u32;
        let sample = LatencySample {
            capture_ts_ns: 0,
            latency_ns: clamped,
            exchange_id,
            protocol_tag,
        };
        self.push(sample);
        self.lifetime.record(clamped, target_us);
        self.record_exchange(exchange_id, clamped, target_us);
    }

    /// Computes `recv - send` and records it, with `capture_ts_ns` set to
    /// `send_ns`. Drops the sample if `recv <= send`. See [`Self::record`]
    /// for `target_us`.
    pub fn record_from_timestamps(
        &self,
        send_ns: u64,
        recv_ns: u64,
        exchange_id: u32,
        protocol_tag: crate::parser::L4Protocol,
        target_us: u32,
    ) {
        if recv_ns <= send_ns {
            self.lifetime.bad_samples.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let latency_ns = (recv_ns - send_ns).min(MAX_LATENCY_NS) as u32;
        let sample = LatencySample {
            capture_ts_ns: send_ns,
            latency_ns,
            exchange_id,
            protocol_tag,
        };
        self.push(sample);
        self.lifetime.record(latency_ns, target_us);
        self.record_exchange(exchange_id, latency_ns, target_us);
    }

    fn record_exchange(&self, exchange_id: u32, latency_ns: u32, target_us: u32) {
        let mut per_exchange = self.per_exchange.lock().unwrap();
        per_exchange
            .entry(exchange_id)
            .or_insert_with(|| Lifetime::new(target_us))
            .record(latency_ns, target_us);
    }

    fn push(&self, sample: LatencySample) {
        let mut ring = self.ring.lock().unwrap();
        if ring.samples.len() < self.window_size {
            ring.samples.push(sample);
        } else {
            let idx = ring.next;
            ring.samples[idx] = sample;
        }
        ring.next = (ring.next + 1) % self.window_size;
    }

    /// Rank-based percentile over the current window: snapshot, sort
    /// ascending, return the value at rank `floor(p/100*(count-1))`.
    pub fn percentile(&self, p: f64) -> f64 {
        let ring = self.ring.lock().unwrap();
        percentile_of(&ring.samples, p, |s| s.latency_ns)
    }

    pub fn stats(&self) -> LatencyStats {
        let ring = self.ring.lock().unwrap();
        Self::stats_over(&self.lifetime, &ring.samples, self.default_target_us)
    }

    /// Same statistics block, scoped to one exchange: windowed percentiles
    /// are filtered to that exchange's samples, and lifetime
    /// count/min/max/mean/σ/violation-rate come from that exchange's own
    /// running totals (not the engine-wide lifetime), so `target_us` and
    /// `violation_rate` reflect the target that exchange actually records
    /// against. Returns a zeroed snapshot if the exchange has no recorded
    /// samples yet.
    pub fn stats_by_exchange(&self, exchange_id: u32) -> LatencyStats {
        let ring = self.ring.lock().unwrap();
        let filtered: Vec<LatencySample> = ring
            .samples
            .iter()
            .copied()
            .filter(|s| s.exchange_id == exchange_id)
            .collect();
        drop(ring);

        let per_exchange = self.per_exchange.lock().unwrap();
        match per_exchange.get(&exchange_id) {
            Some(lifetime) => {
                let target_us = lifetime.target_us.load(Ordering::Relaxed);
                Self::stats_over(lifetime, &filtered, target_us)
            }
            None => LatencyStats::default(),
        }
    }

    fn stats_over(lifetime: &Lifetime, samples: &[LatencySample], target_us: u32) -> LatencyStats {
        let count = lifetime.count.load(Ordering::Relaxed);
        let min_ns = lifetime.min_ns.load(Ordering::Relaxed);
        let max_ns = lifetime.max_ns.load(Ordering::Relaxed);
        let sum_ns = lifetime.sum_ns.load(Ordering::Relaxed);
        let sum_sq_ns = *lifetime.sum_sq_ns.lock().unwrap();
        let violations = lifetime.violations.load(Ordering::Relaxed);

        let mean_ns = if count > 0 {
            sum_ns as f64 / count as f64
        } else {
            0.0
        };
        let variance = if count > 0 {
            (sum_sq_ns / count as f64) - mean_ns * mean_ns
        } else {
            0.0
        };
        let stddev_ns = variance.max(0.0).sqrt();
        let violation_rate = if count > 0 {
            violations as f64 / count as f64
        } else {
            0.0
        };

        LatencyStats {
            count,
            min_ns: if count > 0 { min_ns } else { 0 },
            max_ns,
            mean_ns,
            stddev_ns,
            p50_us: percentile_of(samples, 50.0, |s| s.latency_ns) / 1000.0,
            p95_us: percentile_of(samples, 95.0, |s| s.latency_ns) / 1000.0,
            p99_us: percentile_of(samples, 99.0, |s| s.latency_ns) / 1000.0,
            p999_us: percentile_of(samples, 99.9, |s| s.latency_ns) / 1000.0,
            target_us,
            violation_rate,
        }
    }
}

fn percentile_of<F>(samples: &[LatencySample], p: f64, key: F) -> f64
where
    F: Fn(&LatencySample) -> u32,
{
    if samples.is_empty() {
        return 0.0;
    }
    let mut values: Vec<u32> = samples.iter().map(key).collect();
    values.sort_unstable();
    let rank = ((p / 100.0) * (values.len() as f64 - 1.0)).floor() as usize;
    f64::from(values[rank.min(values.len() - 1)])
}
