//! Minimal local HTTP control server: `POST/GET /switch/<N>` and `GET /status`.
//!
//! Deliberately not built on a framework — this is a tiny, one-request-per-
//! connection listener over `std::net::TcpListener`, matching the weight of
//! the control surface the spec calls for.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use serde_json::json;

use crate::engine::EngineHandle;
use crate::error::{EngineError, EngineResult};
use crate::switch_state::{policy_from_mode, SwitchOrigin};

const ACCEPT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

pub struct ControlServer {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ControlServer {
    pub fn start(handle: EngineHandle, port: u16) -> EngineResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).map_err(|e| EngineError::Bind {
            port,
            reason: e.to_string(),
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| EngineError::Bind {
                port,
                reason: e.to_string(),
            })?;

        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();

        let thread = thread::spawn(move || {
            Self::accept_loop(listener, handle, running_thread);
        });

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    fn accept_loop(listener: TcpListener, handle: EngineHandle, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(e) = handle_connection(stream, &handle) {
                        warn!("control connection error: {e}");
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_TIMEOUT);
                }
                Err(e) => {
                    warn!("control server accept error: {e}");
                    thread::sleep(ACCEPT_POLL_TIMEOUT);
                }
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, handle: &EngineHandle) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(1)))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Drain and ignore headers; this server never reads a body.
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let (status, body) = route(handle, request_line.trim());
    debug!("control request: {} -> {status}", request_line.trim());

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())
}

fn route(handle: &EngineHandle, request_line: &str) -> (&'static str, String) {
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    if (method == "GET" || method == "POST") && path.starts_with("/switch/") {
        return switch_response(handle, &path["/switch/".len()..]);
    }
    if method == "GET" && path == "/status" {
        let body = json!({
            "active_source": handle.active_index(),
            "num_sources": handle.num_sources(),
        });
        return ("200 OK", body.to_string());
    }
    ("404 Not Found", json!({"error": "not found"}).to_string())
}

/// Splits `3?policy=cutover` into (`"3"`, `Some("cutover")`).
fn split_target_and_mode(path_tail: &str) -> (&str, Option<&str>) {
    match path_tail.split_once('?') {
        Some((target, query)) => {
            let mode = query
                .split('&')
                .find_map(|kv| kv.strip_prefix("policy="));
            (target, mode)
        }
        None => (path_tail, None),
    }
}

fn switch_response(handle: &EngineHandle, path_tail: &str) -> (&'static str, String) {
    let (target, mode) = split_target_and_mode(path_tail);
    let Ok(index) = target.parse::<usize>() else {
        return (
            "400 Bad Request",
            json!({"error": "invalid source"}).to_string(),
        );
    };
    let policy = policy_from_mode(mode);
    match handle.request_switch(index, policy, SwitchOrigin::Operator) {
        Ok(()) => (
            "200 OK",
            json!({"status": "ok", "source": index.to_string()}).to_string(),
        ),
        Err(EngineError::InvalidRequest(_)) => (
            "400 Bad Request",
            json!({"error": "invalid source"}).to_string(),
        ),
        Err(_) => (
            "400 Bad Request",
            json!({"error": "request failed"}).to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_path_parses_without_a_handle() {
        let mut parts = "GET /status HTTP/1.1".split_whitespace();
        assert_eq!(parts.next(), Some("GET"));
        assert_eq!(parts.next(), Some("/status"));
    }

    #[test]
    fn switch_path_strips_prefix_correctly() {
        let path = "/switch/3";
        assert_eq!(&path["/switch/".len()..], "3");
    }

    #[test]
    fn split_target_and_mode_parses_a_bare_index() {
        assert_eq!(split_target_and_mode("3"), ("3", None));
    }

    #[test]
    fn split_target_and_mode_parses_a_policy_query_param() {
        assert_eq!(
            split_target_and_mode("3?policy=cutover"),
            ("3", Some("cutover"))
        );
    }
}
