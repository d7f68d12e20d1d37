//! Source descriptor and reader thread: one per upstream, running for the
//! engine's lifetime.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::ring::PacketRing;
use crate::upstream::{Upstream, UpstreamRead};

const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Liveness counters updated only by the reader thread, read by the health
/// monitor and the status endpoint. `AtomicU64`/`AtomicBool` reads here are
/// relaxed by design: the health monitor re-polls every couple of seconds,
/// so a torn or stale read costs nothing.
#[derive(Default)]
pub struct SourceStats {
    pub last_packet_time_ms: AtomicU64,
    pub packets_read: AtomicU64,
    pub is_healthy: AtomicBool,
}

impl SourceStats {
    pub fn snapshot(&self) -> SourceStatsSnapshot {
        SourceStatsSnapshot {
            last_packet_time_ms: self.last_packet_time_ms.load(Ordering::Relaxed),
            packets_read: self.packets_read.load(Ordering::Relaxed),
            is_healthy: self.is_healthy.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceStatsSnapshot {
    pub last_packet_time_ms: u64,
    pub packets_read: u64,
    pub is_healthy: bool,
}

/// A single upstream source: its ring, its liveness stats, and the handle to
/// the reader thread that feeds it.
pub struct Source {
    pub index: usize,
    pub url: String,
    pub ring: Arc<PacketRing>,
    pub stats: Arc<SourceStats>,
    running: Arc<AtomicBool>,
    // A Mutex, not a plain Option, because Source lives inside an
    // Arc<Vec<Source>> shared with the health monitor and dispatcher once
    // the engine is running — stop() needs to work through a shared reference.
    reader_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Source {
    pub fn new(index: usize, url: String, ring_capacity: usize) -> Self {
        Self {
            index,
            url,
            ring: Arc::new(PacketRing::new(ring_capacity)),
            stats: Arc::new(SourceStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            reader_thread: Mutex::new(None),
        }
    }

    /// Spawn the reader loop for this source. `upstream` must already be open.
    pub fn start(&self, mut upstream: Box<dyn Upstream>, clock: Arc<dyn Clock>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let running = self.running.clone();
        let ring = self.ring.clone();
        let stats = self.stats.clone();
        let index = self.index;

        let handle = thread::spawn(move || {
            Self::reader_loop(index, running, ring, stats, upstream.as_mut(), clock);
        });
        *self.reader_thread.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.ring.close();
        if let Some(handle) = self.reader_thread.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn reader_loop(
        index: usize,
        running: Arc<AtomicBool>,
        ring: Arc<PacketRing>,
        stats: Arc<SourceStats>,
        upstream: &mut dyn Upstream,
        clock: Arc<dyn Clock>,
    ) {
        while running.load(Ordering::SeqCst) {
            match upstream.read() {
                UpstreamRead::Packet(pkt) => {
                    stats.last_packet_time_ms.store(clock.now_ms(), Ordering::Relaxed);
                    stats.packets_read.fetch_add(1, Ordering::Relaxed);
                    if ring.put(pkt).is_err() {
                        break;
                    }
                }
                UpstreamRead::WouldBlock => {
                    // Deliberately do not touch last_packet_time here: the health
                    // monitor relies on it going stale when the source actually stalls.
                    thread::sleep(TRANSIENT_RETRY_DELAY);
                }
                UpstreamRead::Fatal(reason) => {
                    warn!("source {index} reader exiting on fatal upstream error: {reason}");
                    break;
                }
            }
        }
        debug!("source {index} reader loop stopped");
        ring.close();
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.stop();
    }
}
