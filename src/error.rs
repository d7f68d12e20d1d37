//! Error taxonomy for the switch engine.

use thiserror::Error;

/// Fatal and recoverable errors surfaced by the engine's public API.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to open upstream source {index} ({url}): {reason}")]
    UpstreamOpen {
        index: usize,
        url: String,
        reason: String,
    },

    #[error("fatal read error on source {index}: {reason}")]
    UpstreamRead { index: usize, reason: String },

    #[error("failed to bind control server on port {port}: {reason}")]
    Bind { port: u16, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Non-error outcomes of a dispatcher pull. These are expected steady-state
/// results, not failures, so they live outside `EngineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Caller should call again; nothing was ready yet.
    TryAgain,
    /// The active source (and no failover target) has reached end of stream.
    EndOfStream,
}
