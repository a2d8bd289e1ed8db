//! Pipeline orchestrator (C6).
//!
//! Wires capture sources to parser workers to consumer sinks through two
//! stages of [`crate::queue::Queue`], with hysteresis-based shed-mode
//! back-pressure and a single shutdown flag polled between dequeues. This
//! module owns no I/O: capture sources hand in already-read frame bytes,
//! consumers are callbacks.

use crate::backoff::Backoff;
use crate::config::EngineConfig;
use crate::error::PipelineError;
use crate::latency::LatencyTracker;
use crate::metrics::{MetricsSnapshot, ShedStats};
use crate::parser::Parser;
use crate::pool::{BlockHandle, Pool};
use crate::queue::Queue;
use crate::registry::ExchangeRegistry;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One ingress frame as handed to the pipeline by a capture source.
pub struct Frame {
    pub handle: BlockHandle,
    pub len: usize,
    pub capture_ts_ns: u64,
}

/// A parsed record paired with the block that still backs its bytes,
/// en route to a consumer sink.
pub struct ParsedItem {
    pub handle: BlockHandle,
    pub record: crate::parser::ParsedRecord,
}

/// Hysteresis-gated shed state shared between one capture actor (or
/// parser-to-consumer stage) and its back-pressure policy. `AtomicBool`
/// for the mode flag plus a counter; no locking.
struct ShedGate {
    active: AtomicBool,
    shed_total: AtomicU64,
    high_watermark: f64,
    low_watermark: f64,
}

impl ShedGate {
    fn new(high_watermark: f64, low_watermark: f64) -> Self {
        Self {
            active: AtomicBool::new(false),
            shed_total: AtomicU64::new(0),
            high_watermark,
            low_watermark,
        }
    }

    /// Updates shed-mode state from the observed fill ratio and returns
    /// whether shed mode is (now) active. Hysteresis: enters at
    /// `> high_watermark`, clears at `< low_watermark`.
    fn update(&self, fill_ratio: f64) -> bool {
        let was_active = self.active.load(Ordering::Relaxed);
        let now_active = if was_active {
            fill_ratio >= self.low_watermark
        } else {
            fill_ratio > self.high_watermark
        };
        if now_active != was_active {
            self.active.store(now_active, Ordering::Relaxed);
            tracing::info!(fill_ratio, now_active, "shed mode transition");
        }
        now_active
    }

    fn record_shed(&self) {
        self.shed_total.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> ShedStats {
        ShedStats {
            shed_total: self.shed_total.load(Ordering::Relaxed),
            shed_mode_active: self.active.load(Ordering::Relaxed),
        }
    }
}

/// Owns every shared resource (pool, registry, queues, tracker) and the
/// shutdown flag. Capture/parser/consumer call sites hold an `Arc<Engine>`
/// and drive the hot-path loops themselves — thread roles are pinned by
/// the caller, not owned as thread handles internal to this type, so
/// callers retain control of their own runtime/affinity setup.
pub struct Engine {
    pub pool: Pool,
    pub registry: ExchangeRegistry,
    pub ingress: Queue<Frame>,
    pub egress: Queue<ParsedItem>,
    pub latency: LatencyTracker,
    shutdown: AtomicBool,
    ingress_shed: ShedGate,
    egress_shed: ShedGate,
    backoff_spins: u32,
    backoff_yield_after: u32,
    default_latency_target_us: u32,
}

impl Engine {
    /// Builds the engine from a fully-populated [`EngineConfig`].
    ///
    /// # Errors
    /// Propagates [`PipelineError::InvalidConfig`] /
    /// [`PipelineError::ArenaReservationFailed`] from pool construction;
    /// construction failure is fatal and surfaced at startup.
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        let pool = Pool::new(config.pool)?;
        let registry = ExchangeRegistry::new(&config.exchanges);
        let ingress_capacity = crate::config::round_up_capacity(config.queues.ingress_capacity);
        let egress_capacity = crate::config::round_up_capacity(config.queues.egress_capacity);
        let default_latency_target_us = config.latency.default_target_us;

        Ok(Self {
            pool,
            registry,
            ingress: Queue::new(ingress_capacity),
            egress: Queue::new(egress_capacity),
            latency: LatencyTracker::new(config.latency),
            shutdown: AtomicBool::new(false),
            ingress_shed: ShedGate::new(
                config.orchestrator.shed_high_watermark,
                config.orchestrator.shed_low_watermark,
            ),
            egress_shed: ShedGate::new(
                config.orchestrator.shed_high_watermark,
                config.orchestrator.shed_low_watermark,
            ),
            backoff_spins: config.orchestrator.backoff_spins,
            backoff_yield_after: config.orchestrator.backoff_yield_after,
            default_latency_target_us,
        })
    }

    /// Signals shutdown; hot-path loops observe this between dequeues and
    /// enter drain.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn backoff(&self) -> Backoff {
        Backoff::with_limits(self.backoff_spins, self.backoff_yield_after)
    }

    /// Capture-side submission: a capture actor has already acquired
    /// `handle` from `self.pool`, copied/referenced the frame into it, and
    /// timestamped it. Applies the spin/yield/shed discipline: a bounded
    /// backoff on a failed push, then shed mode, in which the frame is
    /// counted as dropped and the block released immediately.
    pub fn submit_frame(&self, handle: BlockHandle, len: usize, capture_ts_ns: u64) {
        let mut frame = Frame {
            handle,
            len,
            capture_ts_ns,
        };

        if self.ingress_shed.update(self.ingress.fill_ratio()) {
            self.ingress_shed.record_shed();
            self.pool.release(frame.handle);
            return;
        }

        let mut backoff = self.backoff();
        loop {
            match self.ingress.try_push(frame) {
                Ok(()) => return,
                Err(rejected) => {
                    frame = rejected;
                    if backoff.is_completed() {
                        self.ingress_shed.record_shed();
                        self.pool.release(frame.handle);
                        return;
                    }
                    backoff.snooze();
                }
            }
        }
    }

    /// Drives one iteration of a parser worker: pops one frame from
    /// ingress, parses it, records a latency sample, and forwards to
    /// egress (shedding parsed records under the same discipline). Returns
    /// `false` when the engine has entered shutdown and the ingress queue
    /// has drained, signalling the worker to exit.
    pub fn run_parser_step(&self, parser: &Parser<'_>, now_ns: u64) -> bool {
        let Some(frame) = self.ingress.try_pop() else {
            return !self.is_shutting_down();
        };

        // SAFETY: this worker is the sole holder of `frame.handle` between
        // pop and either forward-to-egress or release-on-reject.
        let bytes = unsafe { frame.handle.as_slice() };
        let parsed = parser.parse(&bytes[..frame.len], frame.capture_ts_ns);

        let Some(record) = parsed else {
            self.pool.release(frame.handle);
            return true;
        };

        let target_us = self
            .registry
            .latency_target_us(record.exchange_id)
            .unwrap_or(self.default_latency_target_us);
        self.latency.record(
            now_ns.saturating_sub(frame.capture_ts_ns),
            record.exchange_id,
            record.protocol,
            target_us,
        );

        let mut item = ParsedItem {
            handle: frame.handle,
            record,
        };

        if self.egress_shed.update(self.egress.fill_ratio()) {
            self.egress_shed.record_shed();
            self.pool.release(item.handle);
            return true;
        }

        let mut backoff = self.backoff();
        loop {
            match self.egress.try_push(item) {
                Ok(()) => return true,
                Err(rejected) => {
                    item = rejected;
                    if backoff.is_completed() {
                        self.egress_shed.record_shed();
                        self.pool.release(item.handle);
                        return true;
                    }
                    backoff.snooze();
                }
            }
        }
    }

    /// Pops one parsed item for a consumer sink. Returns `None` when
    /// draining during shutdown has emptied the egress queue.
    pub fn consume(&self) -> Option<ParsedItem> {
        self.egress.try_pop()
    }

    /// Drains both queues, releasing every held block, for graceful
    /// shutdown: drains each queue until empty, releases any held blocks,
    /// and returns. No work may outlive the pool lifetime.
    pub fn drain(&self) {
        while let Some(frame) = self.ingress.try_pop() {
            self.pool.release(frame.handle);
        }
        while let Some(item) = self.egress.try_pop() {
            self.pool.release(item.handle);
        }
    }

    /// Builds a read-only metrics snapshot. Parser counters live
    /// per-worker, so callers pass each worker's
    /// [`crate::parser::Parser::counters`] snapshot in; this aggregates
    /// them rather than the engine owning the parsers itself.
    pub fn metrics<'a>(
        &self,
        parser_snapshots: impl IntoIterator<Item = &'a crate::parser::ParserCountersSnapshot>,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            pool: self.pool.stats(),
            ingress_queue: self.ingress.stats(),
            egress_queue: self.egress.stats(),
            parser: crate::parser::ParserCountersSnapshot::sum(parser_snapshots),
            latency: self.latency.stats(),
            ingress_shed: self.ingress_shed.stats(),
            egress_shed: self.egress_shed.stats(),
        }
    }
}

// `Engine` is `Send + Sync` automatically: every field (`Pool`, `Queue<T>`,
// `ExchangeRegistry`, `LatencyTracker`, the atomics in `ShedGate`) already
// carries its own synchronization, so an `&Engine` may be shared across
// capture/parser/consumer threads via `Arc<Engine>` with no unsafe impl
// needed here.
