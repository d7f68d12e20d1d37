//! Control surface: a local HTTP server and a keyboard-hook entry point, both
//! translating external requests into [`crate::switch_state::SwitchState`] mutations.

pub mod http;
pub mod keyboard;

pub use http::ControlServer;
pub use keyboard::{cli_status, cli_switch};
