use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::CommandReceiver;
use crate::cmd::registry::{CommandHandler, CommandHandlerRegistry};
use crate::conn::mock::MockConnection;
use crate::conn::ProfilingConnection;
use crate::error::{Error, Result};
use crate::packet::{Packet, PacketVersionResolver, Version};
use crate::state::ProfilingState;

struct Recorder {
    packet_id: u32,
    calls: AtomicUsize,
    fail_with_wrong_state: bool,
}

impl Recorder {
    fn new(packet_id: u32, fail_with_wrong_state: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            packet_id,
            calls: AtomicUsize::new(0),
            fail_with_wrong_state,
        })
    }
}

impl CommandHandler for Recorder {
    fn family(&self) -> u32 {
        0
    }
    fn packet_id(&self) -> u32 {
        self.packet_id
    }
    fn version(&self) -> u32 {
        Version::new(1, 0, 0).encoded()
    }
    fn handle(&self, _packet: &Packet) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_with_wrong_state {
            return Err(Error::WrongState {
                operation: "recorder",
                state: ProfilingState::NotConnected,
            });
        }
        Ok(())
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn test_dispatches_queued_packets() {
    let conn = Arc::new(MockConnection::new());
    let registry = Arc::new(CommandHandlerRegistry::new());
    let handler = Recorder::new(5, false);
    registry.register(handler.clone()).unwrap();

    conn.queue_incoming(Packet::new(0, 5, Vec::new()));
    conn.queue_incoming(Packet::new(0, 5, Vec::new()));

    let receiver = CommandReceiver::new();
    receiver.start(conn.clone(), Arc::clone(&registry), PacketVersionResolver);
    assert!(wait_until(Duration::from_secs(1), || {
        handler.calls.load(Ordering::Relaxed) == 2
    }));
    receiver.stop();
    assert!(!receiver.is_running());
}

#[test]
fn test_unknown_packet_is_skipped() {
    let conn = Arc::new(MockConnection::new());
    let registry = Arc::new(CommandHandlerRegistry::new());
    let handler = Recorder::new(5, false);
    registry.register(handler.clone()).unwrap();

    // No handler for id 9: logged and skipped, the loop keeps going.
    conn.queue_incoming(Packet::new(0, 9, Vec::new()));
    conn.queue_incoming(Packet::new(0, 5, Vec::new()));

    let receiver = CommandReceiver::new();
    receiver.start(conn.clone(), Arc::clone(&registry), PacketVersionResolver);
    assert!(wait_until(Duration::from_secs(1), || {
        handler.calls.load(Ordering::Relaxed) == 1
    }));
    assert!(receiver.is_running());
    receiver.stop();
}

#[test]
fn test_wrong_state_is_fatal_to_the_loop() {
    let conn = Arc::new(MockConnection::new());
    let registry = Arc::new(CommandHandlerRegistry::new());
    let failing = Recorder::new(1, true);
    let other = Recorder::new(5, false);
    registry.register(failing.clone()).unwrap();
    registry.register(other.clone()).unwrap();

    conn.queue_incoming(Packet::new(0, 1, Vec::new()));
    conn.queue_incoming(Packet::new(0, 5, Vec::new()));

    let receiver = CommandReceiver::new();
    receiver.start(conn.clone(), Arc::clone(&registry), PacketVersionResolver);
    assert!(wait_until(Duration::from_secs(1), || !receiver.is_running()));

    // The packet behind the fatal one was never dispatched.
    assert_eq!(failing.calls.load(Ordering::Relaxed), 1);
    assert_eq!(other.calls.load(Ordering::Relaxed), 0);
    receiver.stop();
}

#[test]
fn test_connection_failure_ends_the_loop() {
    let conn = Arc::new(MockConnection::new());
    let registry = Arc::new(CommandHandlerRegistry::new());

    let receiver = CommandReceiver::new();
    receiver.start(conn.clone(), Arc::clone(&registry), PacketVersionResolver);
    assert!(receiver.is_running());

    conn.close();
    assert!(wait_until(Duration::from_secs(2), || !receiver.is_running()));
    receiver.stop();
}

#[test]
fn test_stop_without_traffic() {
    let conn = Arc::new(MockConnection::new());
    let registry = Arc::new(CommandHandlerRegistry::new());

    let receiver = CommandReceiver::new();
    receiver.start(conn, registry, PacketVersionResolver);
    receiver.stop();
    assert!(!receiver.is_running());
}
