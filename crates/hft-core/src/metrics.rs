//! Read-only metrics surface (C7).
//!
//! A single snapshot struct aggregating counters from C1, C2, C3, C4, and
//! C6. Readers copy the struct; no locks are taken beyond whatever each
//! source component already uses internally for its own counters.

use crate::latency::LatencyStats;
use crate::parser::ParserCountersSnapshot;
use crate::pool::PoolStats;
use crate::queue::QueueStats;

/// Shed counters for one direction of back-pressure (capture->ingress or
/// parser->egress).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShedStats {
    pub shed_total: u64,
    pub shed_mode_active: bool,
}

/// Full read-only snapshot, composed from every component's own stats
/// accessor.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub pool: PoolStats,
    pub ingress_queue: QueueStats,
    pub egress_queue: QueueStats,
    pub parser: ParserCountersSnapshot,
    pub latency: LatencyStats,
    pub ingress_shed: ShedStats,
    pub egress_shed: ShedStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_plain_copyable_data() {
        let snap = MetricsSnapshot {
            pool: PoolStats::default(),
            ingress_queue: QueueStats::default(),
            egress_queue: QueueStats::default(),
            parser: ParserCountersSnapshot::default(),
            latency: LatencyStats::default(),
            ingress_shed: ShedStats::default(),
            egress_shed: ShedStats::default(),
        };
        let copy = snap;
        assert_eq!(copy.pool.allocated, 0);
    }
}
