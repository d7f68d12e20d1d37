//! switch-engine: a multi-source live video switcher.
//!
//! Ingests N concurrent compressed-packet video streams through per-source
//! ring buffers, switches which source is forwarded downstream at keyframe
//! boundaries (with a forced-switch timeout fallback), runs a two-stage
//! health-monitor failover, and rewrites timestamps so the output stays
//! monotone across switches. Demuxing/encoding and the enclosing pipeline's
//! own I/O are out of scope — see [`upstream::Upstream`] for the boundary.

pub mod clock;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod health;
pub mod keyframe;
pub mod packet;
pub mod ring;
pub mod source;
pub mod switch_state;
pub mod timestamp;
pub mod upstream;

pub use config::EngineConfig;
pub use engine::{Engine, EngineHandle};
pub use error::{EngineError, EngineResult, PullOutcome};
pub use packet::{CodecHint, Packet};
