//! The consumer thread draining committed buffers onto the connection.


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::buffer::BufferManager;
use crate::conn::{LocalPacketHandler, ProfilingConnection};
use crate::packet::split_frames;
use crate::send::counter::SendCounterPacket;
use crate::state::{ProfilingState, ProfilingStateMachine};

struct Shared {
    state: Arc<ProfilingStateMachine>,
    buffer_manager: Arc<BufferManager>,
    send_counter: SendCounterPacket,
    local_handlers: Arc<RwLock<Vec<Arc<dyn LocalPacketHandler>>>>,
    running: AtomicBool,
    packet_sent: Mutex<bool>,
    packet_sent_posted: Condvar,
}

/// Single consumer of the buffer pool.
///
/// Started while the pipeline is `WaitingForAck`, its first output is the
/// stream-metadata packet; afterwards it blocks on the pool and writes each
/// committed buffer to the connection, duplicating the contained packets to
/// any local packet handlers first. A write failure ends the thread; the
/// next [`update`][crate::service::ProfilingService::update] drives
/// reconnection.
pub struct SendThread {
    shared: Arc<Shared>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SendThread {
    pub fn new(
        state: Arc<ProfilingStateMachine>,
        buffer_manager: Arc<BufferManager>,
        send_counter: SendCounterPacket,
        local_handlers: Arc<RwLock<Vec<Arc<dyn LocalPacketHandler>>>>,
    ) -> SendThread {
        SendThread {
            shared: Arc::new(Shared {
                state,
                buffer_manager,
                send_counter,
                local_handlers,
                running: AtomicBool::new(false),
                packet_sent: Mutex::new(false),
                packet_sent_posted: Condvar::new(),
            }),
            join: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn start(&self, connection: Arc<dyn ProfilingConnection>) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.buffer_manager.resume();
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("profiling-send".to_string())
            .spawn(move || send_loop(&shared, connection.as_ref()))
            .expect("spawning the send thread");
        *self.join.lock().unwrap() = Some(handle);
    }

    /// Stops the consumer after it drained the committed backlog.
    pub fn stop(&self) {
        self.shared.buffer_manager.stop();
        if let Some(handle) = self.join.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                log::error!("send thread panicked: {e:?}");
            }
        }
        self.shared.running.store(false, Ordering::Release);
    }

    /// Blocks until the next buffer hits the connection, or `timeout`.
    ///
    /// Returns whether a packet went out; expiry logs a warning and is not
    /// an error.
    pub fn wait_for_packet_sent(&self, timeout: Duration) -> bool {
        let mut sent = self.shared.packet_sent.lock().unwrap();
        *sent = false;
        let (sent, wait) = self
            .shared
            .packet_sent_posted
            .wait_timeout_while(sent, timeout, |sent| !*sent)
            .unwrap();
        if wait.timed_out() && !*sent {
            log::warn!("timed out after {timeout:?} waiting for a packet send");
            return false;
        }
        true
    }
}

fn send_loop(shared: &Shared, connection: &dyn ProfilingConnection) {
    // The monitor learns who we are before anything else reaches it.
    if shared.state.current_state() == ProfilingState::WaitingForAck {
        if let Err(e) = shared.send_counter.send_stream_metadata_packet() {
            log::warn!("could not enqueue the stream-metadata packet: {e}");
        }
    }

    while let Some(buffer) = shared.buffer_manager.wait_for_readable_buffer() {
        fan_out_to_local_handlers(shared, buffer.as_slice());
        let result = connection.write_packet_data(buffer.as_slice());
        shared.buffer_manager.mark_read(buffer);
        match result {
            Ok(()) => {
                *shared.packet_sent.lock().unwrap() = true;
                shared.packet_sent_posted.notify_all();
            }
            Err(e) => {
                log::error!("send thread terminating, connection write failed: {e}");
                break;
            }
        }
    }
    shared.running.store(false, Ordering::Release);
}

fn fan_out_to_local_handlers(shared: &Shared, data: &[u8]) {
    let handlers = shared.local_handlers.read().unwrap();
    if handlers.is_empty() {
        return;
    }
    match split_frames(data) {
        Ok(packets) => {
            for packet in &packets {
                for handler in handlers.iter() {
                    handler.on_packet(packet);
                }
            }
        }
        Err(e) => log::warn!("outbound buffer not parseable for local handlers: {e}"),
    }
}
