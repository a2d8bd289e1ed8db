//! Latency-critical substrate of an HFT network-analysis engine.
//!
//! This crate implements the hot path shared by every downstream
//! consumer of exchange market data: a fixed-block memory pool, a
//! lock-free bounded MPMC queue, a zero-copy packet parser, a rolling
//! latency tracker, an exchange registry, a pipeline orchestrator tying
//! them together with back-pressure, and a read-only metrics snapshot.
//!
//! Configuration loading (YAML/JSON), log formatting, metrics export,
//! and higher-level analytics (arbitrage, compliance) are external
//! collaborators and live outside this crate.
//!
//! ```no_run
//! use hft_core::config::EngineConfig;
//! use hft_core::pipeline::Engine;
//!
//! let engine = Engine::new(EngineConfig::with_default_exchanges())
//!     .expect("engine config should be valid");
//!
//! // Capture side:
//! if let Some(handle) = engine.pool.acquire() {
//!     engine.submit_frame(handle, 0, 0);
//! }
//!
//! // Parser worker side:
//! let registry_parser = hft_core::parser::Parser::new(&engine.registry);
//! engine.run_parser_step(&registry_parser, 0);
//!
//! // Consumer side:
//! if let Some(item) = engine.consume() {
//!     engine.pool.release(item.handle);
//! }
//! ```

mod align;
pub mod backoff;
pub mod config;
pub mod error;
mod invariants;
pub mod latency;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod registry;

pub use config::EngineConfig;
pub use error::PipelineError;
pub use metrics::MetricsSnapshot;
pub use pipeline::Engine;
