//! End-to-end scenarios seeding the test suite.

use hft_core::config::{EngineConfig, LatencyConfig, OrchestratorConfig, PoolConfig, QueueConfig};
use hft_core::parser::{L4Protocol, Parser};
use hft_core::pipeline::Engine;
use hft_core::registry::{default_exchange_configs, ExchangeRegistry, NYSE};

fn build_tcp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 14];
    frame[12] = 0x08;
    frame[13] = 0x00;

    let mut ip = vec![0u8; 20];
    ip[0] = 0x45;
    ip[9] = 6;
    ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
    ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
    frame.extend_from_slice(&ip);

    let mut tcp = vec![0u8; 20];
    tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    tcp[12] = 5 << 4;
    frame.extend_from_slice(&tcp);
    frame.extend_from_slice(payload);
    frame
}

fn build_udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 14];
    frame[12] = 0x08;
    frame[13] = 0x00;

    let mut ip = vec![0u8; 20];
    ip[0] = 0x45;
    ip[9] = 17;
    ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
    ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
    frame.extend_from_slice(&ip);

    let mut udp = vec![0u8; 8];
    udp[0..2].copy_from_slice(&src_port.to_be_bytes());
    udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&udp);
    frame.extend_from_slice(payload);
    frame
}

/// Scenario 1: single NYSE TCP packet carrying a FIX payload.
#[test]
fn scenario_single_nyse_tcp_packet() {
    let registry = ExchangeRegistry::new(&default_exchange_configs());
    let parser = Parser::new(&registry);
    let frame = build_tcp_frame(54321, 4001, b"8=FIX.4.2\x019=...");

    let record = parser.parse(&frame, 1_000_000).expect("frame should parse");
    assert_eq!(record.exchange_id, NYSE);
    assert!(record.is_fix);
    assert_eq!(record.protocol, L4Protocol::Tcp);
    assert_eq!(parser.counters().snapshot().non_trading_skipped, 0);
}

/// Scenario 2: UDP traffic to a non-trading port (DNS) is discarded.
#[test]
fn scenario_udp_non_trading_is_skipped() {
    let registry = ExchangeRegistry::new(&default_exchange_configs());
    let parser = Parser::new(&registry);
    let frame = build_udp_frame(54321, 53, b"");

    assert!(parser.parse(&frame, 1_000_000).is_none());
    assert_eq!(parser.counters().snapshot().non_trading_skipped, 1);
}

/// Scenario 3: pool exhaustion and recovery.
#[test]
fn scenario_pool_exhaustion_and_recovery() {
    let pool = hft_core::pool::Pool::new(PoolConfig {
        pool_bytes: 4 * 64,
        block_bytes: 64,
        use_mapped_arena: false,
    })
    .unwrap();

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

/// Scenario 4: a full queue rejects the ninth push and preserves FIFO
/// order for the first eight.
#[test]
fn scenario_queue_full_preserves_order() {
    let queue = hft_core::queue::Queue::<u32>::new(8);
    for i in 0..8 {
        assert!(queue.try_push(i).is_ok());
    }
    assert_eq!(queue.try_push(999), Err(999));

    for i in 0..8 {
        assert_eq!(queue.try_pop(), Some(i));
    }
    assert_eq!(queue.try_pop(), None);
}

/// Scenario 5: 200,000 samples into a 100,000-sample window.
#[test]
fn scenario_latency_window_overflow() {
    let tracker = hft_core::latency::LatencyTracker::new(LatencyConfig {
        window_size: 100_000,
        default_target_us: 500,
    });
    for v in 1..=200_000u64 {
        tracker.record(v * 1000, 0, L4Protocol::Tcp, 500);
    }

    let stats = tracker.stats();
    assert_eq!(stats.count, 200_000);
    assert_eq!(stats.min_ns, 1000);
    assert_eq!(stats.max_ns, 200_000_000);
    assert!(stats.p50_us > 140_000.0 && stats.p50_us < 160_000.0);
}

/// Scenario 6: back-pressure under a paused parser worker sheds at
/// steady state without leaking blocks.
#[test]
fn scenario_back_pressure_sheds_without_leaking() {
    let config = EngineConfig {
        pool: PoolConfig {
            pool_bytes: 200 * 64,
            block_bytes: 64,
            use_mapped_arena: false,
        },
        queues: QueueConfig {
            ingress_capacity: 16,
            egress_capacity: 16,
        },
        exchanges: default_exchange_configs(),
        latency: LatencyConfig::default(),
        orchestrator: OrchestratorConfig {
            parser_workers: 1,
            shed_high_watermark: 0.9,
            shed_low_watermark: 0.7,
            backoff_spins: 2,
            backoff_yield_after: 3,
        },
    };
    let engine = Engine::new(config).unwrap();

    // Parser worker is "paused": nothing pops the ingress queue while we
    // inject 100 frames.
    for _ in 0..100 {
        if let Some(h) = engine.pool.acquire() {
            engine.submit_frame(h, 64, 0);
        }
    }

    let shed = engine.metrics(&[]).ingress_shed.shed_total;
    assert!(shed >= 80, "expected shed >= 80, got {shed}");

    engine.shutdown();
    engine.drain();
    assert_eq!(engine.pool.stats().allocated, 0);
}
