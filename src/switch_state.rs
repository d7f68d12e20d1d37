//! The switch state machine: the single piece of shared mutable state that
//! the dispatcher, health monitor, and control surface all touch.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;

/// Who asked for a switch. Used only to decide whether to stamp the manual
/// switch grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOrigin {
    Operator,
    Monitor,
}

/// How a requested switch should be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPolicy {
    /// Wait for a keyframe on the target source (subject to forced-switch timeout).
    Seamless,
    /// Commit on the next available packet from the target, keyframe or not.
    Cutover,
    /// Commit immediately, same as `Cutover`; the downstream decoder is
    /// expected to resync on its own rather than the dispatcher waiting.
    Graceful,
}

/// Maps a control-surface mode string to a policy. Unrecognized or absent
/// modes default to `Seamless`, the safest choice for an unattended request.
pub fn policy_from_mode(mode: Option<&str>) -> SwitchPolicy {
    match mode {
        Some(m) if m.eq_ignore_ascii_case("cutover") => SwitchPolicy::Cutover,
        Some(m) if m.eq_ignore_ascii_case("graceful") => SwitchPolicy::Graceful,
        _ => SwitchPolicy::Seamless,
    }
}

struct State {
    active_index: usize,
    pending_index: Option<usize>,
    wait_for_iframe: bool,
    pending_since: u64,
    last_manual_switch_time: u64,
}

/// A consistent, momentary view of the switch state.
#[derive(Debug, Clone, Copy)]
pub struct SwitchSnapshot {
    pub active_index: usize,
    pub pending_index: Option<usize>,
    pub wait_for_iframe: bool,
    pub pending_since: u64,
    pub last_manual_switch_time: u64,
}

pub struct SwitchState {
    inner: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl SwitchState {
    pub fn new(initial_active: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(State {
                active_index: initial_active,
                pending_index: None,
                wait_for_iframe: false,
                pending_since: 0,
                last_manual_switch_time: 0,
            }),
            clock,
        }
    }

    /// Post a switch request. A request targeting the already-active source
    /// with nothing else pending is a no-op. A second request for the same
    /// target while one is already pending just refreshes its policy.
    pub fn request_switch(&self, target: usize, policy: SwitchPolicy, origin: SwitchOrigin) {
        let now = self.clock.now_ms();
        let mut state = self.inner.lock();
        if target == state.active_index && state.pending_index.is_none() {
            return;
        }
        state.pending_index = Some(target);
        state.wait_for_iframe = matches!(policy, SwitchPolicy::Seamless);
        state.pending_since = now;
        if origin == SwitchOrigin::Operator {
            state.last_manual_switch_time = now;
        }
    }

    /// Commit the pending switch, if any. Only the dispatcher calls this.
    /// Returns the newly active index, or `None` if nothing was pending.
    pub fn commit_switch(&self) -> Option<usize> {
        let mut state = self.inner.lock();
        let target = state.pending_index.take()?;
        state.active_index = target;
        state.wait_for_iframe = false;
        Some(target)
    }

    pub fn read_snapshot(&self) -> SwitchSnapshot {
        let state = self.inner.lock();
        SwitchSnapshot {
            active_index: state.active_index,
            pending_index: state.pending_index,
            wait_for_iframe: state.wait_for_iframe,
            pending_since: state.pending_since,
            last_manual_switch_time: state.last_manual_switch_time,
        }
    }

    pub fn active_index(&self) -> usize {
        self.inner.lock().active_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn state() -> (SwitchState, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new(1_000));
        (SwitchState::new(0, clock.clone()), clock)
    }

    #[test]
    fn request_for_active_with_no_pending_is_noop() {
        let (s, _) = state();
        s.request_switch(0, SwitchPolicy::Seamless, SwitchOrigin::Operator);
        let snap = s.read_snapshot();
        assert_eq!(snap.pending_index, None);
    }

    #[test]
    fn repeated_requests_for_same_target_coalesce() {
        let (s, _) = state();
        s.request_switch(2, SwitchPolicy::Seamless, SwitchOrigin::Monitor);
        s.request_switch(2, SwitchPolicy::Cutover, SwitchOrigin::Monitor);
        let snap = s.read_snapshot();
        assert_eq!(snap.pending_index, Some(2));
        assert!(!snap.wait_for_iframe);
        let committed = s.commit_switch();
        assert_eq!(committed, Some(2));
        assert_eq!(s.commit_switch(), None);
    }

    #[test]
    fn operator_origin_stamps_manual_switch_time() {
        let (s, clock) = state();
        clock.set(5_000);
        s.request_switch(1, SwitchPolicy::Seamless, SwitchOrigin::Operator);
        assert_eq!(s.read_snapshot().last_manual_switch_time, 5_000);
    }

    #[test]
    fn monitor_origin_does_not_stamp_manual_switch_time() {
        let (s, clock) = state();
        clock.set(5_000);
        s.request_switch(1, SwitchPolicy::Seamless, SwitchOrigin::Monitor);
        assert_eq!(s.read_snapshot().last_manual_switch_time, 0);
    }

    #[test]
    fn commit_updates_active_and_clears_pending() {
        let (s, _) = state();
        s.request_switch(3, SwitchPolicy::Cutover, SwitchOrigin::Operator);
        assert_eq!(s.commit_switch(), Some(3));
        assert_eq!(s.active_index(), 3);
        assert_eq!(s.read_snapshot().pending_index, None);
    }

    #[test]
    fn graceful_policy_does_not_wait_for_a_keyframe() {
        let (s, _) = state();
        s.request_switch(1, SwitchPolicy::Graceful, SwitchOrigin::Operator);
        assert!(!s.read_snapshot().wait_for_iframe);
    }

    #[test]
    fn policy_from_mode_recognizes_all_three_modes_case_insensitively() {
        assert_eq!(policy_from_mode(None), SwitchPolicy::Seamless);
        assert_eq!(policy_from_mode(Some("bogus")), SwitchPolicy::Seamless);
        assert_eq!(policy_from_mode(Some("Seamless")), SwitchPolicy::Seamless);
        assert_eq!(policy_from_mode(Some("CUTOVER")), SwitchPolicy::Cutover);
        assert_eq!(policy_from_mode(Some("graceful")), SwitchPolicy::Graceful);
    }
}
