use thiserror::Error;

/// Startup-time failures, fatal and surfaced to the caller at
/// initialization. Nothing on the hot path returns this type; resource
/// exhaustion and malformed input are counters, not errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pool's backing arena could not be reserved.
    #[error("failed to reserve {pool_bytes} bytes for the block pool arena")]
    ArenaReservationFailed { pool_bytes: usize },

    /// A configured capacity, block size, or exchange descriptor is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}
