//! In-memory connection double shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::packet::{split_frames, Packet};

use super::ProfilingConnection;

/// Records outbound bytes and replays queued inbound packets.
pub struct MockConnection {
    open: AtomicBool,
    fail_writes: AtomicBool,
    written: Mutex<Vec<u8>>,
    inbound: Mutex<VecDeque<Packet>>,
    inbound_posted: Condvar,
}

impl MockConnection {
    pub fn new() -> MockConnection {
        MockConnection {
            open: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
            inbound_posted: Condvar::new(),
        }
    }

    /// Queues a command for the receive loop to pick up.
    pub fn queue_incoming(&self, packet: Packet) {
        self.inbound.lock().unwrap().push_back(packet);
        self.inbound_posted.notify_all();
    }

    /// Everything written so far, parsed back into packets.
    pub fn written_packets(&self) -> Vec<Packet> {
        split_frames(&self.written.lock().unwrap()).unwrap()
    }

    pub fn clear_written(&self) {
        self.written.lock().unwrap().clear();
    }

    /// Makes every subsequent write fail with an I/O error.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::Release);
    }
}

impl ProfilingConnection for MockConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.inbound_posted.notify_all();
    }

    fn write_packet_data(&self, data: &[u8]) -> Result<()> {
        if !self.is_open() || self.fail_writes.load(Ordering::Acquire) {
            return Err(Error::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn read_packet(&self, timeout: Duration) -> Result<Packet> {
        let mut inbound = self.inbound.lock().unwrap();
        loop {
            if !self.is_open() {
                return Err(Error::Io(std::io::ErrorKind::BrokenPipe.into()));
            }
            if let Some(packet) = inbound.pop_front() {
                return Ok(packet);
            }
            let (guard, wait) = self
                .inbound_posted
                .wait_timeout(inbound, timeout)
                .unwrap();
            inbound = guard;
            if wait.timed_out() {
                return Err(Error::Timeout(timeout));
            }
        }
    }
}
