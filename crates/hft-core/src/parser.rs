//! Zero-copy trading-packet parser (C3).
//!
//! Walks Ethernet → IPv4 → TCP|UDP headers over a borrowed byte slice,
//! consults the exchange registry for classification, and checks for the
//! FIX ASCII prefix. Allocates nothing and retains no reference to the
//! input past the call.

use crate::registry::ExchangeRegistry;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

const ETH_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;
const FIX_PREFIX: &[u8; 5] = b"8=FIX";

/// L4 transport protocol, as observed by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L4Protocol {
    Tcp,
    Udp,
}

/// Immutable classification of one parsed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRecord {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: L4Protocol,
    /// `0` means unknown.
    pub exchange_id: u32,
    pub is_fix: bool,
    pub frame_len: u32,
    pub capture_ts_ns: u64,
}

/// Why a frame failed to parse. Purely diagnostic — the contract return
/// type is still `Option<ParsedRecord>`; this is exposed for counters and
/// tracing, not propagated as an error — malformed and non-trading frames
/// are counters, not exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectReason {
    Malformed,
    NonTrading,
}

/// Per-worker counters. Not shared across threads; aggregated by C7 at
/// snapshot time.
#[derive(Debug, Default)]
pub struct ParserCounters {
    pub packets_parsed: AtomicU64,
    pub bytes_processed: AtomicU64,
    pub non_trading_skipped: AtomicU64,
    pub malformed_rejected: AtomicU64,
}

impl ParserCounters {
    pub fn snapshot(&self) -> ParserCountersSnapshot {
        ParserCountersSnapshot {
            packets_parsed: self.packets_parsed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            non_trading_skipped: self.non_trading_skipped.load(Ordering::Relaxed),
            malformed_rejected: self.malformed_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParserCountersSnapshot {
    pub packets_parsed: u64,
    pub bytes_processed: u64,
    pub non_trading_skipped: u64,
    pub malformed_rejected: u64,
}

impl ParserCountersSnapshot {
    /// Aggregates per-worker snapshots into one total for the C7 metrics
    /// surface, since parser state is per-worker and only aggregated at
    /// snapshot time.
    pub fn sum<'a>(snapshots: impl IntoIterator<Item = &'a ParserCountersSnapshot>) -> Self {
        let mut total = Self::default();
        for s in snapshots {
            total.packets_parsed += s.packets_parsed;
            total.bytes_processed += s.bytes_processed;
            total.non_trading_skipped += s.non_trading_skipped;
            total.malformed_rejected += s.malformed_rejected;
        }
        total
    }
}

/// A pure function of its input bytes and the exchange registry snapshot.
/// Holds a registry reference and a set of counters; carries no other
/// state.
pub struct Parser<'a> {
    registry: &'a ExchangeRegistry,
    counters: ParserCounters,
}

impl<'a> Parser<'a> {
    pub fn new(registry: &'a ExchangeRegistry) -> Self {
        Self {
            registry,
            counters: ParserCounters::default(),
        }
    }

    pub fn counters(&self) -> &ParserCounters {
        &self.counters
    }

    /// Parses one Ethernet II frame. Returns `None` for anything not
    /// IPv4/TCP/UDP-on-a-registered-port, bumping the matching counter.
    pub fn parse(&self, bytes: &[u8], capture_ts_ns: u64) -> Option<ParsedRecord> {
        match parse_frame(bytes, capture_ts_ns, self.registry) {
            Ok(record) => {
                self.counters.packets_parsed.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_processed
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                Some(record)
            }
            Err(RejectReason::Malformed) => {
                self.counters
                    .malformed_rejected
                    .fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(RejectReason::NonTrading) => {
                self.counters
                    .non_trading_skipped
                    .fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

/// Free function doing the actual header walk — kept separate from
/// `Parser::parse` so it is trivially fuzzable/testable without a
/// registry-bearing receiver and without touching counters.
fn parse_frame(
    bytes: &[u8],
    capture_ts_ns: u64,
    registry: &ExchangeRegistry,
) -> Result<ParsedRecord, RejectReason> {
    if bytes.len() < ETH_HEADER_LEN {
        return Err(RejectReason::Malformed);
    }
    let ethertype = u16::from_be_bytes([bytes[12], bytes[13]]);
    if ethertype != ETHERTYPE_IPV4 {
        return Err(RejectReason::Malformed);
    }

    const IP_HEADER_MIN: usize = ETH_HEADER_LEN + 20;
    if bytes.len() < IP_HEADER_MIN {
        return Err(RejectReason::Malformed);
    }
    let ip = &bytes[ETH_HEADER_LEN..];
    let version = ip[0] >> 4;
    if version != 4 {
        return Err(RejectReason::Malformed);
    }
    let ihl = usize::from(ip[0] & 0x0F) * 4;
    if ihl < 20 || bytes.len() < ETH_HEADER_LEN + ihl {
        return Err(RejectReason::Malformed);
    }
    let protocol = ip[9];
    let src_addr = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst_addr = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

    let l4_start = ETH_HEADER_LEN + ihl;
    let (l4_protocol, src_port, dst_port, payload_start) = match protocol {
        IPPROTO_TCP => {
            if bytes.len() < l4_start + 20 {
                return Err(RejectReason::Malformed);
            }
            let l4 = &bytes[l4_start..];
            let src_port = u16::from_be_bytes([l4[0], l4[1]]);
            let dst_port = u16::from_be_bytes([l4[2], l4[3]]);
            let data_offset_flags = l4[12];
            let tcp_hdr_len = usize::from((data_offset_flags >> 4) & 0x0F) * 4;
            if tcp_hdr_len < 20 || bytes.len() < l4_start + tcp_hdr_len {
                return Err(RejectReason::Malformed);
            }
            (L4Protocol::Tcp, src_port, dst_port, l4_start + tcp_hdr_len)
        }
        IPPROTO_UDP => {
            if bytes.len() < l4_start + 8 {
                return Err(RejectReason::Malformed);
            }
            let l4 = &bytes[l4_start..];
            let src_port = u16::from_be_bytes([l4[0], l4[1]]);
            let dst_port = u16::from_be_bytes([l4[2], l4[3]]);
            (L4Protocol::Udp, src_port, dst_port, l4_start + 8)
        }
        _ => return Err(RejectReason::Malformed),
    };

    // Destination wins first, then source.
    let exchange_id = match registry.lookup(dst_port, l4_protocol) {
        crate::registry::UNKNOWN_EXCHANGE => registry.lookup(src_port, l4_protocol),
        id => id,
    };
    if exchange_id == crate::registry::UNKNOWN_EXCHANGE {
        return Err(RejectReason::NonTrading);
    }

    let payload = &bytes[payload_start.min(bytes.len())..];
    let is_fix = payload.len() >= 8 && &payload[..5] == FIX_PREFIX;

    Ok(ParsedRecord {
        src_addr,
        dst_addr,
        src_port,
        dst_port,
        protocol: l4_protocol,
        exchange_id,
        is_fix,
        frame_len: bytes.len() as u32,
        capture_ts_ns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    fn test_registry() -> ExchangeRegistry {
        ExchangeRegistry::new(&crate::registry::default_exchange_configs())
    }

    /// Builds a minimal Ethernet+IPv4+TCP|UDP frame with the given ports
    /// and payload, for use as test fixtures.
    fn build_frame(protocol: u8, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;

        let mut ip = vec![0u8; 20];
        ip[0] = 0x45; // version 4, IHL 5 (20 bytes)
        ip[9] = protocol;
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(&ip);

        match protocol {
            IPPROTO_TCP => {
                let mut tcp = vec![0u8; 20];
                tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
                tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
                tcp[12] = 5 << 4; // data offset 5 words = 20 bytes
                frame.extend_from_slice(&tcp);
            }
            IPPROTO_UDP => {
                let mut udp = vec![0u8; 8];
                udp[0..2].copy_from_slice(&src_port.to_be_bytes());
                udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
                frame.extend_from_slice(&udp);
            }
            _ => unreachable!(),
        }
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn single_nyse_tcp_packet_with_fix() {
        let registry = test_registry();
        let parser = Parser::new(&registry);
        let frame = build_frame(IPPROTO_TCP, 54321, 4001, b"8=FIX.4.2\x019=...");
        let record = parser.parse(&frame, 1000).expect("should parse");
        assert_eq!(record.exchange_id, crate::registry::NYSE);
        assert!(record.is_fix);
        assert_eq!(record.protocol, L4Protocol::Tcp);
        assert_eq!(parser.counters().snapshot().non_trading_skipped, 0);
    }

    #[test]
    fn udp_non_trading_is_skipped() {
        let registry = test_registry();
        let parser = Parser::new(&registry);
        let frame = build_frame(IPPROTO_UDP, 54321, 53, b"");
        assert!(parser.parse(&frame, 1000).is_none());
        assert_eq!(parser.counters().snapshot().non_trading_skipped, 1);
    }

    #[test]
    fn truncation_below_minimum_is_rejected() {
        let registry = test_registry();
        let parser = Parser::new(&registry);
        let frame = build_frame(IPPROTO_TCP, 54321, 4001, b"");
        let truncated = &frame[..frame.len() - 1];
        assert!(parser.parse(truncated, 1000).is_none());
        assert_eq!(parser.counters().snapshot().malformed_rejected, 1);
    }

    #[test]
    fn non_ipv4_ethertype_is_rejected() {
        let registry = test_registry();
        let parser = Parser::new(&registry);
        let mut frame = build_frame(IPPROTO_TCP, 54321, 4001, b"");
        frame[12] = 0x86;
        frame[13] = 0xDD; // IPv6
        assert!(parser.parse(&frame, 1000).is_none());
    }

    #[test]
    fn idempotent_on_same_bytes() {
        let registry = test_registry();
        let parser = Parser::new(&registry);
        let frame = build_frame(IPPROTO_TCP, 54321, 4001, b"8=FIX.4.2\x019=...");
        let first = parser.parse(&frame, 1000);
        let second = parser.parse(&frame, 1000);
        assert_eq!(first, second);
    }

    #[test]
    fn short_fix_prefix_payload_is_not_fix() {
        let registry = test_registry();
        let parser = Parser::new(&registry);
        let frame = build_frame(IPPROTO_TCP, 54321, 4001, b"8=F");
        let record = parser.parse(&frame, 1000).expect("should parse");
        assert!(!record.is_fix);
    }
}
