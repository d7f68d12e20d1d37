//! Health monitor: periodically classifies every source and posts failover
//! requests when the active source degrades. Never commits a switch itself —
//! that's the dispatcher's job, at the next keyframe boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use crate::clock::Clock;
use crate::source::Source;
use crate::switch_state::{SwitchOrigin, SwitchPolicy, SwitchState};

pub struct HealthMonitorConfig {
    pub health_check_interval_ms: u64,
    pub source_timeout_ms: u64,
    pub startup_grace_period_ms: u64,
    pub manual_switch_grace_ms: u64,
    pub auto_failover_enabled: bool,
}

pub struct HealthMonitor {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn start(
        &mut self,
        sources: Arc<Vec<Source>>,
        switch_state: Arc<SwitchState>,
        clock: Arc<dyn Clock>,
        config: HealthMonitorConfig,
    ) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = self.running.clone();
        let startup_time = clock.now_ms();

        self.thread = Some(thread::spawn(move || {
            Self::monitor_loop(running, sources, switch_state, clock, config, startup_time);
        }));
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    fn monitor_loop(
        running: Arc<AtomicBool>,
        sources: Arc<Vec<Source>>,
        switch_state: Arc<SwitchState>,
        clock: Arc<dyn Clock>,
        config: HealthMonitorConfig,
        startup_time: u64,
    ) {
        let black_index = sources.len() - 1;
        while running.load(Ordering::SeqCst) {
            if config.auto_failover_enabled {
                Self::tick(&sources, &switch_state, clock.as_ref(), &config, startup_time, black_index);
            }
            thread::sleep(Duration::from_millis(config.health_check_interval_ms));
        }
    }

    fn tick(
        sources: &[Source],
        switch_state: &SwitchState,
        clock: &dyn Clock,
        config: &HealthMonitorConfig,
        startup_time: u64,
        black_index: usize,
    ) {
        let now = clock.now_ms();
        if now.saturating_sub(startup_time) < config.startup_grace_period_ms {
            return;
        }

        let snapshot = switch_state.read_snapshot();
        let active = snapshot.active_index;

        for (i, source) in sources.iter().enumerate() {
            let was_healthy = source.stats.is_healthy.load(Ordering::Relaxed);
            let healthy = Self::classify(
                i, active, source, now, config, startup_time, black_index, &snapshot,
            );
            source.stats.is_healthy.store(healthy, Ordering::Relaxed);
            if was_healthy && !healthy {
                warn!("source {i} transitioned healthy -> unhealthy");
            } else if !was_healthy && healthy {
                info!("source {i} transitioned unhealthy -> healthy");
            }
        }

        let active_healthy = sources[active].stats.is_healthy.load(Ordering::Relaxed);
        if !active_healthy && snapshot.pending_index.is_none() {
            let target = if active != black_index {
                Some(black_index)
            } else {
                (0..black_index).find(|&i| sources[i].stats.is_healthy.load(Ordering::Relaxed))
            };
            if let Some(target) = target {
                info!("health monitor requesting failover: {active} -> {target}");
                switch_state.request_switch(target, SwitchPolicy::Seamless, SwitchOrigin::Monitor);
            }
        }
    }

    fn classify(
        index: usize,
        active: usize,
        source: &Source,
        now: u64,
        config: &HealthMonitorConfig,
        startup_time: u64,
        black_index: usize,
        snapshot: &crate::switch_state::SwitchSnapshot,
    ) -> bool {
        if index == black_index {
            return true;
        }
        if index == active {
            let in_manual_grace =
                now.saturating_sub(snapshot.last_manual_switch_time) < config.manual_switch_grace_ms;
            if in_manual_grace {
                return true;
            }
            let stats = source.stats.snapshot();
            if stats.packets_read == 0 {
                return now.saturating_sub(startup_time) < config.startup_grace_period_ms + config.source_timeout_ms;
            }
            return now.saturating_sub(stats.last_packet_time_ms) <= config.source_timeout_ms;
        }
        // Backup sources are judged by whether their reader is actively
        // producing, i.e. there is at least one packet queued for them.
        !source.ring.is_empty()
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::packet::CodecHint;
    use crate::upstream::mock::{ExhaustBehavior, MockUpstream};
    use crate::upstream::UpstreamRead;
    use bytes::Bytes;
    use crate::packet::Packet;

    fn pkt() -> Packet {
        Packet::new(Bytes::from_static(b"x"), 0, 0, CodecHint::Other)
    }

    fn default_config() -> HealthMonitorConfig {
        HealthMonitorConfig {
            health_check_interval_ms: 2000,
            source_timeout_ms: 5000,
            startup_grace_period_ms: 0,
            manual_switch_grace_ms: 3000,
            auto_failover_enabled: true,
        }
    }

    #[test]
    fn stalled_active_source_marked_unhealthy_after_timeout() {
        let clock = Arc::new(MockClock::new(0));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let switch_state = Arc::new(SwitchState::new(0, dyn_clock.clone()));

        let source0 = Source::new(0, "a".into(), 8);
        source0.start(
            Box::new(MockUpstream::new(
                vec![UpstreamRead::Packet(pkt())],
                ExhaustBehavior::WouldBlockForever,
            )),
            dyn_clock.clone(),
        );
        thread::sleep(Duration::from_millis(30));
        let source1 = Source::new(1, "black".into(), 8);
        let sources = Arc::new(vec![source0, source1]);

        let config = default_config();
        clock.advance(6000);
        HealthMonitor::tick(&sources, &switch_state, dyn_clock.as_ref(), &config, 0, 1);

        assert!(!sources[0].stats.is_healthy.load(Ordering::Relaxed));
        assert_eq!(switch_state.read_snapshot().pending_index, Some(1));
    }

    #[test]
    fn black_interim_is_always_healthy() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new(0));
        let switch_state = Arc::new(SwitchState::new(1, clock.clone()));
        let sources = Arc::new(vec![Source::new(0, "a".into(), 8), Source::new(1, "black".into(), 8)]);
        let config = default_config();
        HealthMonitor::tick(&sources, &switch_state, clock.as_ref(), &config, 0, 1);
        assert!(sources[1].stats.is_healthy.load(Ordering::Relaxed));
    }

    #[test]
    fn startup_grace_period_skips_classification() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new(0));
        let switch_state = Arc::new(SwitchState::new(0, clock.clone()));
        let sources = Arc::new(vec![Source::new(0, "a".into(), 8), Source::new(1, "black".into(), 8)]);
        let mut config = default_config();
        config.startup_grace_period_ms = 10_000;
        HealthMonitor::tick(&sources, &switch_state, clock.as_ref(), &config, 0, 1);
        // Stats never touched, so both remain at the AtomicBool default (false).
        assert!(!sources[0].stats.is_healthy.load(Ordering::Relaxed));
        assert_eq!(switch_state.read_snapshot().pending_index, None);
    }
}
