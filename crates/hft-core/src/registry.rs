//! Exchange registry (C5).
//!
//! Immutable after construction; consulted by the parser for
//! `{port -> exchange-id, latency-target}` classification. Expected set
//! sizes are small (≤16 ports per exchange) so a flat linear scan beats a
//! hash map for this L1-resident data.

use crate::config::{ExchangeConfig, ProtocolTag};
use std::net::Ipv4Addr;

pub const NYSE: u32 = 1;
pub const NASDAQ: u32 = 2;
pub const CBOE: u32 = 3;
pub const UNKNOWN_EXCHANGE: u32 = 0;

struct Entry {
    exchange_id: u32,
    ports: Vec<u16>,
    protocol: ProtocolTag,
    latency_target_us: u32,
}

/// Read-only `{port -> exchange}` lookup table, built once at startup.
pub struct ExchangeRegistry {
    entries: Vec<Entry>,
}

impl ExchangeRegistry {
    /// Builds a registry from the configured exchange descriptors.
    /// Port sets may overlap only across exchanges with disjoint
    /// protocols; this is not validated here — the registry is fully
    /// configurable and trusts its caller.
    pub fn new(exchanges: &[ExchangeConfig]) -> Self {
        let entries = exchanges
            .iter()
            .map(|e| Entry {
                exchange_id: e.exchange_id,
                ports: e.ports.clone(),
                protocol: e.protocol,
                latency_target_us: e.latency_target_us,
            })
            .collect();
        Self { entries }
    }

    /// Classifies a port against the registry for a given observed
    /// protocol. Returns `0` (unknown) if no entry matches.
    pub fn lookup(&self, port: u16, protocol: crate::parser::L4Protocol) -> u32 {
        for entry in &self.entries {
            if entry.protocol.matches(protocol) && entry.ports.contains(&port) {
                return entry.exchange_id;
            }
        }
        UNKNOWN_EXCHANGE
    }

    /// Latency target in microseconds for a given exchange id, or `None`
    /// if the id is not registered (caller should fall back to
    /// `LatencyConfig::default_target_us`).
    pub fn latency_target_us(&self, exchange_id: u32) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.exchange_id == exchange_id)
            .map(|e| e.latency_target_us)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Seed exchange descriptors: NYSE=1, NASDAQ=2, CBOE=3, with their
/// default port sets. Hosts are left empty — this crate
/// classifies by port, not source address; callers needing host-bound
/// classification populate `ExchangeConfig::hosts` themselves.
pub fn default_exchange_configs() -> Vec<ExchangeConfig> {
    vec![
        ExchangeConfig {
            exchange_id: NYSE,
            name: "NYSE".to_string(),
            hosts: Vec::<Ipv4Addr>::new(),
            ports: vec![4001, 9001, 8001, 7001],
            protocol: ProtocolTag::Both,
            latency_target_us: 500,
        },
        ExchangeConfig {
            exchange_id: NASDAQ,
            name: "NASDAQ".to_string(),
            hosts: Vec::<Ipv4Addr>::new(),
            ports: vec![4002, 9002, 8002, 7002],
            protocol: ProtocolTag::Both,
            latency_target_us: 500,
        },
        ExchangeConfig {
            exchange_id: CBOE,
            name: "CBOE".to_string(),
            hosts: Vec::<Ipv4Addr>::new(),
            ports: vec![4003, 9003, 8003, 7003],
            protocol: ProtocolTag::Both,
            latency_target_us: 500,
        },
    ]
}
