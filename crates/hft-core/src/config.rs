//! In-process configuration structs consumed at startup.
//!
//! Loading these from YAML/JSON is explicitly out of scope; a
//! caller-supplied loader is expected to populate these plain structs and
//! hand them to [`crate::pipeline::Engine::new`].

/// Pool construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Total arena size in bytes. Combined with `block_bytes` this implies
    /// `num_blocks = pool_bytes / block_bytes`.
    pub pool_bytes: usize,
    /// Size of one block, in bytes. Power-of-two recommended.
    pub block_bytes: usize,
    /// Whether to pre-fault every page of the arena at construction via
    /// `Pool::prefault`. Does not change correctness, only whether the
    /// first touch of each page happens at startup or lazily.
    pub use_mapped_arena: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_bytes: 4096 * 4096,
            block_bytes: 4096,
            use_mapped_arena: true,
        }
    }
}

/// Queue construction parameters. Non-power-of-two capacities are rounded
/// up with a warning; the queue itself rejects non-powers outright as a
/// contract violation.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub ingress_capacity: usize,
    pub egress_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: 4096,
            egress_capacity: 4096,
        }
    }
}

/// Rounds a requested capacity up to the next power of two, warning if it
/// had to change the value.
pub(crate) fn round_up_capacity(requested: usize) -> usize {
    let rounded = requested.max(1).next_power_of_two();
    if rounded != requested {
        tracing::warn!(
            requested,
            rounded,
            "queue capacity is not a power of two; rounding up"
        );
    }
    rounded
}

/// L4 protocol a given exchange's feed runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolTag {
    Tcp,
    Udp,
    Both,
}

impl ProtocolTag {
    pub(crate) fn matches(self, observed: crate::parser::L4Protocol) -> bool {
        match (self, observed) {
            (ProtocolTag::Both, _) => true,
            (ProtocolTag::Tcp, crate::parser::L4Protocol::Tcp) => true,
            (ProtocolTag::Udp, crate::parser::L4Protocol::Udp) => true,
            _ => false,
        }
    }
}

/// One exchange's registry entry.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub exchange_id: u32,
    pub name: String,
    pub hosts: Vec<std::net::Ipv4Addr>,
    pub ports: Vec<u16>,
    pub protocol: ProtocolTag,
    pub latency_target_us: u32,
}

/// Latency tracker construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct LatencyConfig {
    /// Size of the rolling percentile window (default 10^5).
    pub window_size: usize,
    /// Default violation target in microseconds, used when no per-exchange
    /// target applies.
    pub default_target_us: u32,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            window_size: 100_000,
            default_target_us: 500,
        }
    }
}

/// Orchestrator back-pressure / worker-pool parameters.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub parser_workers: usize,
    pub shed_high_watermark: f64,
    pub shed_low_watermark: f64,
    pub backoff_spins: u32,
    pub backoff_yield_after: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parser_workers: 2,
            shed_high_watermark: 0.9,
            shed_low_watermark: 0.7,
            backoff_spins: 6,
            backoff_yield_after: 10,
        }
    }
}

/// The full structured startup document, aggregated for convenience. Each
/// section can also be constructed and passed independently to the
/// corresponding module.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub queues: QueueConfig,
    pub exchanges: Vec<ExchangeConfig>,
    pub latency: LatencyConfig,
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    /// Default config seeded with the recognized exchange identifiers
    /// (NYSE=1, NASDAQ=2, CBOE=3).
    pub fn with_default_exchanges() -> Self {
        Self {
            pool: PoolConfig::default(),
            queues: QueueConfig::default(),
            exchanges: crate::registry::default_exchange_configs(),
            latency: LatencyConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_default_exchanges()
    }
}
