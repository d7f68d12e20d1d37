//! The read-packet dispatcher: the consumer side of the engine, driven by
//! the downstream pipeline pulling for its next packet.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::clock::Clock;
use crate::error::PullOutcome;
use crate::keyframe::is_keyframe;
use crate::packet::Packet;
use crate::ring::RingError;
use crate::source::Source;
use crate::switch_state::{SwitchOrigin, SwitchPolicy, SwitchState};
use crate::timestamp::TimestampNormalizer;

/// Result of one dispatcher pull.
pub enum PullResult {
    Packet(Packet),
    Outcome(PullOutcome),
}

/// Window given to a pending source to produce a keyframe before the
/// dispatcher falls back to polling the active source again.
const PENDING_POLL_TIMEOUT: Duration = Duration::from_millis(20);
const AUTO_FAILOVER_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct Dispatcher {
    switch_state: Arc<SwitchState>,
    normalizer: TimestampNormalizer,
    clock: Arc<dyn Clock>,
    forced_switch_timeout_ms: u64,
    manual_switch_grace_ms: u64,
    auto_failover_enabled: bool,
}

impl Dispatcher {
    pub fn new(
        switch_state: Arc<SwitchState>,
        clock: Arc<dyn Clock>,
        discontinuity_threshold: i64,
        forced_switch_timeout_ms: u64,
        manual_switch_grace_ms: u64,
        auto_failover_enabled: bool,
    ) -> Self {
        Self {
            switch_state,
            normalizer: TimestampNormalizer::new(discontinuity_threshold),
            clock,
            forced_switch_timeout_ms,
            manual_switch_grace_ms,
            auto_failover_enabled,
        }
    }

    /// Pull the next packet to forward downstream. `sources` is indexed by
    /// source index; `black_index` is the always-healthy failover interim.
    pub fn pull(&mut self, sources: &[Source], black_index: usize) -> PullResult {
        let snapshot = self.switch_state.read_snapshot();

        let Some(pending) = snapshot.pending_index else {
            return self.pull_steady_state(sources, snapshot.active_index, black_index);
        };

        self.pull_with_pending_switch(
            sources,
            snapshot.active_index,
            pending,
            snapshot.wait_for_iframe,
            snapshot.pending_since,
        )
    }

    fn pull_steady_state(
        &mut self,
        sources: &[Source],
        active: usize,
        black_index: usize,
    ) -> PullResult {
        match sources[active].ring.get() {
            Ok(mut pkt) => {
                self.normalizer.normalize(&mut pkt);
                PullResult::Packet(pkt)
            }
            Err(RingError::Closed) => {
                let now = self.clock.now_ms();
                let snapshot = self.switch_state.read_snapshot();
                let in_manual_grace =
                    now.saturating_sub(snapshot.last_manual_switch_time) < self.manual_switch_grace_ms;
                if !self.auto_failover_enabled || in_manual_grace {
                    return PullResult::Outcome(PullOutcome::TryAgain);
                }
                let target = if active != black_index {
                    Some(black_index)
                } else {
                    (0..black_index).find(|&i| sources[i].stats.snapshot().is_healthy)
                };
                match target {
                    Some(target) => {
                        info!("active source {active} exhausted; requesting failover to {target}");
                        self.switch_state.request_switch(
                            target,
                            SwitchPolicy::Seamless,
                            SwitchOrigin::Monitor,
                        );
                        PullResult::Outcome(PullOutcome::TryAgain)
                    }
                    None => PullResult::Outcome(PullOutcome::EndOfStream),
                }
            }
        }
    }

    fn pull_with_pending_switch(
        &mut self,
        sources: &[Source],
        active: usize,
        pending: usize,
        wait_for_iframe: bool,
        pending_since: u64,
    ) -> PullResult {
        let waited_ms = self.clock.now_ms().saturating_sub(pending_since);
        let forced = waited_ms > self.forced_switch_timeout_ms;

        match sources[pending].ring.try_get() {
            Ok(pkt) => {
                if !wait_for_iframe || is_keyframe(&pkt) || forced {
                    return self.commit_and_emit(pkt);
                }
                // Non-IDR packet arrived while still waiting for a clean splice
                // point: drop it and fall through to serve the active source.
            }
            Err(RingError::Closed) => {
                // Pending source is dead; fall through, it'll never produce a keyframe.
            }
            Err(RingError::WouldBlock) => {}
        }

        match sources[active].ring.try_get() {
            Ok(mut pkt) => {
                self.normalizer.normalize(&mut pkt);
                PullResult::Packet(pkt)
            }
            Err(RingError::WouldBlock) => {
                // Active source has nothing queued either. Give the pending
                // source a short blocking window; if a switch is overdue,
                // force it through regardless of keyframe status.
                match sources[pending].ring.get_timeout(PENDING_POLL_TIMEOUT) {
                    Ok(pkt) => {
                        if wait_for_iframe && !is_keyframe(&pkt) && !forced {
                            PullResult::Outcome(PullOutcome::TryAgain)
                        } else {
                            self.commit_and_emit(pkt)
                        }
                    }
                    Err(_) => PullResult::Outcome(PullOutcome::TryAgain),
                }
            }
            Err(RingError::Closed) => {
                if self.auto_failover_enabled {
                    PullResult::Outcome(PullOutcome::TryAgain)
                } else {
                    PullResult::Outcome(PullOutcome::EndOfStream)
                }
            }
        }
    }

    fn commit_and_emit(&mut self, mut pkt: Packet) -> PullResult {
        self.switch_state.commit_switch();
        self.normalizer.reset_offset();
        self.normalizer.normalize(&mut pkt);
        PullResult::Packet(pkt)
    }
}

/// Convenience for hosts that want to busy-poll `Dispatcher::pull` with a
/// short backoff on `TryAgain` rather than spinning.
pub fn retry_delay() -> Duration {
    AUTO_FAILOVER_RETRY_DELAY
}
