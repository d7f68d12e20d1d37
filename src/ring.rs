//! Bounded blocking packet queue: one per source, single producer, single consumer.
//!
//! Built on `parking_lot::Mutex` + `Condvar`, matching this codebase's existing
//! choice of `parking_lot` for every lock off the real-time data path. A
//! lock-free ring is tempting but doesn't give us the blocking `put`/`get`
//! semantics the reader and dispatcher loops need.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// The ring is closed and empty; no more packets will ever arrive.
    Closed,
    /// Non-blocking call found nothing to do right now.
    WouldBlock,
}

struct Inner {
    queue: VecDeque<Packet>,
    capacity: usize,
    eof: bool,
}

/// A bounded FIFO of compressed packets shared between exactly one producer
/// (a source reader) and one consumer (the dispatcher).
pub struct PacketRing {
    inner: Mutex<Inner>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl PacketRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                eof: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Block until there is room, then enqueue `pkt`. Returns `Closed` if the
    /// ring has already been closed.
    pub fn put(&self, pkt: Packet) -> Result<(), RingError> {
        let mut guard = self.inner.lock();
        loop {
            if guard.eof {
                return Err(RingError::Closed);
            }
            if guard.queue.len() < guard.capacity {
                guard.queue.push_back(pkt);
                self.not_empty.notify_one();
                return Ok(());
            }
            self.not_full.wait(&mut guard);
        }
    }

    /// Block until a packet is available or the ring is closed and drained.
    pub fn get(&self) -> Result<Packet, RingError> {
        let mut guard = self.inner.lock();
        loop {
            if let Some(pkt) = guard.queue.pop_front() {
                self.not_full.notify_one();
                return Ok(pkt);
            }
            if guard.eof {
                return Err(RingError::Closed);
            }
            self.not_empty.wait(&mut guard);
        }
    }

    /// Like `get`, but never blocks: returns `WouldBlock` if nothing is queued
    /// and the ring is still open.
    pub fn try_get(&self) -> Result<Packet, RingError> {
        let mut guard = self.inner.lock();
        if let Some(pkt) = guard.queue.pop_front() {
            self.not_full.notify_one();
            return Ok(pkt);
        }
        if guard.eof {
            return Err(RingError::Closed);
        }
        Err(RingError::WouldBlock)
    }

    /// Block for up to `timeout` waiting for a packet. Used by the dispatcher
    /// when it wants to give a pending source a short window to produce a
    /// keyframe without holding the active source's `get` hostage forever.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Packet, RingError> {
        let mut guard = self.inner.lock();
        loop {
            if let Some(pkt) = guard.queue.pop_front() {
                self.not_full.notify_one();
                return Ok(pkt);
            }
            if guard.eof {
                return Err(RingError::Closed);
            }
            let timed_out = self.not_empty.wait_for(&mut guard, timeout).timed_out();
            if timed_out {
                return Err(RingError::WouldBlock);
            }
        }
    }

    /// Mark the ring closed. Idempotent; wakes any blocked producer and
    /// consumer. Queued packets are still drained by subsequent `get` calls.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        guard.eof = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().eof
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::CodecHint;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::thread;

    fn pkt(pts: i64) -> Packet {
        Packet::new(Bytes::from_static(b"x"), pts, pts, CodecHint::Other)
    }

    #[test]
    fn put_then_get_preserves_order() {
        let ring = PacketRing::new(4);
        ring.put(pkt(1)).unwrap();
        ring.put(pkt(2)).unwrap();
        assert_eq!(ring.get().unwrap().pts, 1);
        assert_eq!(ring.get().unwrap().pts, 2);
    }

    #[test]
    fn try_get_on_empty_ring_would_block() {
        let ring = PacketRing::new(4);
        assert_eq!(ring.try_get().unwrap_err(), RingError::WouldBlock);
    }

    #[test]
    fn closed_and_drained_ring_returns_closed() {
        let ring = PacketRing::new(4);
        ring.put(pkt(1)).unwrap();
        ring.close();
        assert_eq!(ring.get().unwrap().pts, 1);
        assert_eq!(ring.get().unwrap_err(), RingError::Closed);
    }

    #[test]
    fn put_after_close_fails() {
        let ring = PacketRing::new(4);
        ring.close();
        assert_eq!(ring.put(pkt(1)).unwrap_err(), RingError::Closed);
    }

    #[test]
    fn producer_blocks_on_full_ring_until_drained() {
        let ring = Arc::new(PacketRing::new(1));
        ring.put(pkt(1)).unwrap();

        let ring2 = ring.clone();
        let handle = thread::spawn(move || {
            ring2.put(pkt(2)).unwrap();
        });

        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.get().unwrap().pts, 1);
        handle.join().unwrap();
        assert_eq!(ring.get().unwrap().pts, 2);
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let ring = Arc::new(PacketRing::new(4));
        let ring2 = ring.clone();
        let handle = thread::spawn(move || ring2.get());
        thread::sleep(std::time::Duration::from_millis(20));
        ring.close();
        assert_eq!(handle.join().unwrap().unwrap_err(), RingError::Closed);
    }
}
