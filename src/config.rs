//! Engine configuration: validated, serializable, and independent of however
//! the host loads it (file, env, flags — all out of scope here).

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upstream source locators. By convention the last entry is a
    /// never-failing "black" source used as the two-stage failover interim.
    pub sources: Vec<String>,
    pub control_port: u16,
    #[serde(default = "default_true")]
    pub auto_failover: bool,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
    #[serde(default)]
    pub startup_grace_period_ms: u64,
    #[serde(default = "default_forced_switch_timeout_ms")]
    pub forced_switch_timeout_ms: u64,
    #[serde(default = "default_manual_switch_grace_ms")]
    pub manual_switch_grace_ms: u64,
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    /// Discontinuity threshold for the timestamp normalizer, in the stream's
    /// own timebase units (not milliseconds — see [`crate::timestamp`]).
    #[serde(default = "default_discontinuity_threshold")]
    pub discontinuity_threshold: i64,
}

fn default_true() -> bool {
    true
}
fn default_health_check_interval_ms() -> u64 {
    2000
}
fn default_source_timeout_ms() -> u64 {
    5000
}
fn default_forced_switch_timeout_ms() -> u64 {
    3000
}
fn default_manual_switch_grace_ms() -> u64 {
    3000
}
fn default_ring_capacity() -> usize {
    90
}
fn default_discontinuity_threshold() -> i64 {
    90_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            control_port: 8099,
            auto_failover: default_true(),
            health_check_interval_ms: default_health_check_interval_ms(),
            source_timeout_ms: default_source_timeout_ms(),
            startup_grace_period_ms: 0,
            forced_switch_timeout_ms: default_forced_switch_timeout_ms(),
            manual_switch_grace_ms: default_manual_switch_grace_ms(),
            ring_capacity: default_ring_capacity(),
            discontinuity_threshold: default_discontinuity_threshold(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sources.len() < 2 {
            return Err(EngineError::Config(
                "at least 2 sources are required (the last is the black interim)".into(),
            ));
        }
        if self.control_port == 0 {
            return Err(EngineError::Config("control_port must be nonzero".into()));
        }
        if !(100..=10_000).contains(&self.health_check_interval_ms) {
            return Err(EngineError::Config(
                "health_check_interval_ms must be in [100, 10000]".into(),
            ));
        }
        if !(1000..=60_000).contains(&self.source_timeout_ms) {
            return Err(EngineError::Config(
                "source_timeout_ms must be in [1000, 60000]".into(),
            ));
        }
        if self.startup_grace_period_ms > 60_000 {
            return Err(EngineError::Config(
                "startup_grace_period_ms must be <= 60000".into(),
            ));
        }
        if self.ring_capacity == 0 {
            return Err(EngineError::Config("ring_capacity must be nonzero".into()));
        }
        Ok(())
    }

    pub fn black_index(&self) -> usize {
        self.sources.len() - 1
    }
}
