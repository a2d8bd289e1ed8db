//! Minimal single-threaded walk through the pipeline: acquire a block,
//! submit a synthesized frame, run one parser step, and consume the
//! result. Demonstrates the public surface end to end; a real deployment
//! would run capture/parser/consumer on dedicated threads.

use hft_core::config::EngineConfig;
use hft_core::parser::Parser;
use hft_core::pipeline::Engine;
use std::time::{SystemTime, UNIX_EPOCH};

fn synth_nyse_tcp_frame() -> Vec<u8> {
    let mut frame = vec![0u8; 14];
    frame[12] = 0x08;
    frame[13] = 0x00;

    let mut ip = vec![0u8; 20];
    ip[0] = 0x45;
    ip[9] = 6; // TCP
    ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
    ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
    frame.extend_from_slice(&ip);

    let mut tcp = vec![0u8; 20];
    tcp[0..2].copy_from_slice(&54321u16.to_be_bytes());
    tcp[2..4].copy_from_slice(&4001u16.to_be_bytes());
    tcp[12] = 5 << 4;
    frame.extend_from_slice(&tcp);
    frame.extend_from_slice(b"8=FIX.4.2\x019=5\x01");
    frame
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

fn main() {
    tracing_subscriber::fmt::init();

    let engine = Engine::new(EngineConfig::with_default_exchanges())
        .expect("default engine config should be valid");

    let frame_bytes = synth_nyse_tcp_frame();
    let capture_ts_ns = now_ns();

    // Capture side: acquire a block, copy the frame into it, submit.
    let handle = engine.pool.acquire().expect("pool should not be exhausted");
    unsafe {
        handle.as_mut_slice()[..frame_bytes.len()].copy_from_slice(&frame_bytes);
    }
    engine.submit_frame(handle, frame_bytes.len(), capture_ts_ns);

    // Parser worker side: one step pops, parses, records latency, and
    // forwards to the egress queue (or releases on reject/shed).
    let parser = Parser::new(&engine.registry);
    engine.run_parser_step(&parser, now_ns());

    // Consumer side: pop the parsed item, inspect it, release the block.
    if let Some(item) = engine.consume() {
        println!(
            "exchange={} is_fix={} protocol={:?}",
            item.record.exchange_id, item.record.is_fix, item.record.protocol
        );
        engine.pool.release(item.handle);
    }

    let parser_snapshot = parser.counters().snapshot();
    let snapshot = engine.metrics([&parser_snapshot]);
    println!(
        "pool: allocated={} free={} packets_parsed={}",
        snapshot.pool.allocated, snapshot.pool.free, snapshot.parser.packets_parsed
    );
}
