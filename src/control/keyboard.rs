//! Keyboard hook entry points for hosts that forward keystrokes into the engine.
//!
//! Both functions take an [`EngineHandle`] explicitly rather than reaching
//! for process-wide state, so a host can run more than one engine instance
//! per process if it ever needs to.

use log::info;

use crate::engine::EngineHandle;
use crate::switch_state::{SwitchOrigin, SwitchPolicy};

/// Handle a digit keypress (`'0'..='9'`) as a manual switch request. Always
/// seamless: a human at the keyboard has no way to specify a policy.
pub fn cli_switch(handle: &EngineHandle, digit: char) {
    let Some(index) = digit.to_digit(10) else {
        return;
    };
    let index = index as usize;
    if index >= handle.num_sources() {
        info!("keyboard switch to {index} ignored: out of range");
        return;
    }
    if let Err(e) = handle.request_switch(index, SwitchPolicy::Seamless, SwitchOrigin::Operator) {
        info!("keyboard switch to {index} rejected: {e}");
    }
}

/// Print a human-readable status report (source health, buffer depth, liveness).
pub fn cli_status(handle: &EngineHandle) {
    print!("{}", handle.status_report());
}
