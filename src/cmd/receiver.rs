//! The receive loop: reads framed packets off the connection and
//! dispatches them.

#[cfg(test)]
mod test;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::conn::ProfilingConnection;
use crate::error::Error;
use crate::packet::PacketVersionResolver;

use super::registry::CommandHandlerRegistry;

/// How long one blocking read may take before the loop polls its stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Worker thread turning inbound packets into handler invocations.
///
/// An unknown packet is logged and skipped; a handler failure or a dead
/// connection ends the loop, and the next
/// [`update`][crate::service::ProfilingService::update] drives reconnection.
pub struct CommandReceiver {
    running: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl CommandReceiver {
    pub fn new() -> CommandReceiver {
        CommandReceiver {
            running: Arc::new(AtomicBool::new(false)),
            join: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(
        &self,
        connection: Arc<dyn ProfilingConnection>,
        registry: Arc<CommandHandlerRegistry>,
        resolver: PacketVersionResolver,
    ) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("profiling-recv".to_string())
            .spawn(move || receive_loop(&running, connection.as_ref(), &registry, &resolver))
            .expect("spawning the receive thread");
        *self.join.lock().unwrap() = Some(handle);
    }

    /// Cooperative stop: raises the flag and joins. The bounded read keeps
    /// the join latency at one timeout.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.join.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                log::error!("receive thread panicked: {e:?}");
            }
        }
    }
}

impl Default for CommandReceiver {
    fn default() -> Self {
        Self::new()
    }
}

fn receive_loop(
    running: &AtomicBool,
    connection: &dyn ProfilingConnection,
    registry: &CommandHandlerRegistry,
    resolver: &PacketVersionResolver,
) {
    while running.load(Ordering::Acquire) {
        let packet = match connection.read_packet(READ_TIMEOUT) {
            Ok(packet) => packet,
            Err(Error::Timeout(_)) => continue,
            Err(e) => {
                log::error!("receive loop terminating, read failed: {e}");
                break;
            }
        };
        match registry.dispatch(&packet, resolver) {
            Ok(()) => {}
            Err(e @ Error::UnknownPacket { .. }) => log::warn!("skipping {packet}: {e}"),
            Err(e) => {
                log::error!("receive loop terminating, {packet} failed: {e}");
                break;
            }
        }
    }
    running.store(false, Ordering::Release);
}
