//! Top-level engine: owns every source, the switch state, the health
//! monitor, and the control server, and wires them together at construction.
//!
//! `EngineHandle` is the opaque, clonable handle the control surface and
//! keyboard hook operate on. There is no process-wide singleton: the host
//! owns the handle and decides where it lives.

use std::sync::Arc;

use log::info;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::control::ControlServer;
use crate::dispatcher::Dispatcher;
use crate::error::{EngineError, EngineResult};
use crate::health::{HealthMonitor, HealthMonitorConfig};
use crate::source::{Source, SourceStatsSnapshot};
use crate::switch_state::{SwitchOrigin, SwitchPolicy, SwitchState};
use crate::upstream::Upstream;

struct EngineInner {
    sources: Arc<Vec<Source>>,
    switch_state: Arc<SwitchState>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

/// Cheaply clonable handle to a running engine. Passed to the control
/// surface and keyboard hook instead of reaching for global state.
#[derive(Clone)]
pub struct EngineHandle(Arc<EngineInner>);

impl EngineHandle {
    pub fn num_sources(&self) -> usize {
        self.0.sources.len()
    }

    pub fn active_index(&self) -> usize {
        self.0.switch_state.active_index()
    }

    pub fn request_switch(
        &self,
        target: usize,
        policy: SwitchPolicy,
        origin: SwitchOrigin,
    ) -> EngineResult<()> {
        if target >= self.num_sources() {
            return Err(EngineError::InvalidRequest(format!(
                "source {target} out of range (have {})",
                self.num_sources()
            )));
        }
        self.0.switch_state.request_switch(target, policy, origin);
        Ok(())
    }

    pub fn source_stats(&self, index: usize) -> Option<SourceStatsSnapshot> {
        self.0.sources.get(index).map(|s| s.stats.snapshot())
    }

    pub fn status_report(&self) -> String {
        let active = self.active_index();
        let mut out = format!("active source: {active}\n");
        for (i, source) in self.0.sources.iter().enumerate() {
            let stats = source.stats.snapshot();
            out.push_str(&format!(
                "  [{i}] {} healthy={} packets_read={} buffer_depth={} ms_since_last={}\n",
                source.url,
                stats.is_healthy,
                stats.packets_read,
                source.ring.len(),
                self.0.clock.now_ms().saturating_sub(stats.last_packet_time_ms),
            ));
        }
        out
    }

    pub fn sources(&self) -> &[Source] {
        &self.0.sources
    }

    pub fn switch_state(&self) -> &Arc<SwitchState> {
        &self.0.switch_state
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.0.clock
    }

    pub fn black_index(&self) -> usize {
        self.0.config.black_index()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.0.config
    }
}

/// Owns the running engine's threads. Dropping this joins everything.
pub struct Engine {
    handle: EngineHandle,
    health_monitor: HealthMonitor,
    control_server: Option<ControlServer>,
}

impl Engine {
    /// Construct and start the engine: opens every upstream (via the
    /// supplied factory), spawns all reader threads, the health monitor, and
    /// the control server.
    pub fn start(
        config: EngineConfig,
        mut open_upstream: impl FnMut(usize, &str) -> EngineResult<Box<dyn Upstream>>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut sources = Vec::with_capacity(config.sources.len());
        for (index, url) in config.sources.iter().enumerate() {
            let source = Source::new(index, url.clone(), config.ring_capacity);
            let upstream = open_upstream(index, url)?;
            source.start(upstream, clock.clone());
            sources.push(source);
        }
        let sources = Arc::new(sources);

        let switch_state = Arc::new(SwitchState::new(0, clock.clone()));

        let inner = Arc::new(EngineInner {
            sources: sources.clone(),
            switch_state: switch_state.clone(),
            clock: clock.clone(),
            config: config.clone(),
        });
        let handle = EngineHandle(inner);

        let mut health_monitor = HealthMonitor::new();
        health_monitor.start(
            sources,
            switch_state,
            clock,
            HealthMonitorConfig {
                health_check_interval_ms: config.health_check_interval_ms,
                source_timeout_ms: config.source_timeout_ms,
                startup_grace_period_ms: config.startup_grace_period_ms,
                manual_switch_grace_ms: config.manual_switch_grace_ms,
                auto_failover_enabled: config.auto_failover,
            },
        );

        let control_server = ControlServer::start(handle.clone(), config.control_port)?;

        info!(
            "switch engine started: {} sources, control port {}",
            handle.num_sources(),
            config.control_port
        );

        Ok(Self {
            handle,
            health_monitor,
            control_server: Some(control_server),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Build a dispatcher bound to this engine's switch state and sources.
    /// The host pipeline owns the dispatcher and calls `pull` on its own thread.
    pub fn new_dispatcher(&self) -> Dispatcher {
        let config = self.handle.config();
        Dispatcher::new(
            self.handle.switch_state().clone(),
            self.handle.clock().clone(),
            config.discontinuity_threshold,
            config.forced_switch_timeout_ms,
            config.manual_switch_grace_ms,
            config.auto_failover,
        )
    }

    pub fn shutdown(&mut self) {
        if let Some(mut server) = self.control_server.take() {
            server.stop();
        }
        self.health_monitor.stop();
        for source in self.handle.0.sources.iter() {
            source.stop();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
