//! Handler for the Connection Acknowledged packet (family 0, id 1).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::BackendRegistry;
use crate::buffer::BufferManager;
use crate::cmd::CommandHandler;
use crate::counters::CounterDirectory;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::send::{SendCounterPacket, TimelineWriter};
use crate::service::ServiceStatus;
use crate::state::{ProfilingState, ProfilingStateMachine};

/// Completes the handshake.
///
/// Allowed only while `WaitingForAck`: moves the pipeline to `Active`,
/// pushes the counter directory out, emits the timeline baseline when the
/// timeline starts enabled, turns profiling on in every backend and signals
/// service activation to anyone blocked on it. An ack arriving in `Active`
/// is a duplicate and is ignored.
pub struct ConnectionAcknowledgedCommandHandler {
    version: u32,
    state: Arc<ProfilingStateMachine>,
    counter_directory: Arc<CounterDirectory>,
    send_counter: SendCounterPacket,
    buffer_manager: Arc<BufferManager>,
    timeline_reporting: Arc<AtomicBool>,
    backends: Arc<BackendRegistry>,
    status: Arc<ServiceStatus>,
}

impl ConnectionAcknowledgedCommandHandler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        version: u32,
        state: Arc<ProfilingStateMachine>,
        counter_directory: Arc<CounterDirectory>,
        send_counter: SendCounterPacket,
        buffer_manager: Arc<BufferManager>,
        timeline_reporting: Arc<AtomicBool>,
        backends: Arc<BackendRegistry>,
        status: Arc<ServiceStatus>,
    ) -> ConnectionAcknowledgedCommandHandler {
        ConnectionAcknowledgedCommandHandler {
            version,
            state,
            counter_directory,
            send_counter,
            buffer_manager,
            timeline_reporting,
            backends,
            status,
        }
    }
}

impl CommandHandler for ConnectionAcknowledgedCommandHandler {
    fn family(&self) -> u32 {
        0
    }

    fn packet_id(&self) -> u32 {
        1
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn handle(&self, packet: &Packet) -> Result<()> {
        if packet.family() != 0 || packet.packet_id() != 1 {
            return Err(Error::InvalidArgument(format!(
                "expected family 0 id 1, got {packet}"
            )));
        }

        match self.state.current_state() {
            ProfilingState::WaitingForAck => {
                self.state.transition_to(ProfilingState::Active)?;
                self.send_counter
                    .send_counter_directory_packet(&self.counter_directory)?;

                if self.timeline_reporting.load(Ordering::Acquire) {
                    let mut writer = TimelineWriter::new(Arc::clone(&self.buffer_manager));
                    writer.send_timeline_message_directory_package()?;
                    writer.send_well_known_labels_and_event_classes()?;
                }

                for (backend_id, context) in self.backends.all() {
                    context.enable_profiling(true).map_err(|e| Error::Backend {
                        backend: backend_id.to_string(),
                        reason: e.to_string(),
                    })?;
                }

                self.status.notify_active();
                Ok(())
            }
            // A retransmitted ack after the handshake completed.
            ProfilingState::Active => Ok(()),
            state => Err(Error::WrongState {
                operation: "connection acknowledged",
                state,
            }),
        }
    }
}
