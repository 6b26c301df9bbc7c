//! Handler for the Request Counter Directory packet (family 0, id 3).

use std::sync::Arc;

use crate::cmd::CommandHandler;
use crate::counters::CounterDirectory;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::send::SendCounterPacket;
use crate::state::{ProfilingState, ProfilingStateMachine};

/// Re-sends the full counter directory on demand.
pub struct RequestCounterDirectoryCommandHandler {
    version: u32,
    state: Arc<ProfilingStateMachine>,
    counter_directory: Arc<CounterDirectory>,
    send_counter: SendCounterPacket,
}

impl RequestCounterDirectoryCommandHandler {
    pub(crate) fn new(
        version: u32,
        state: Arc<ProfilingStateMachine>,
        counter_directory: Arc<CounterDirectory>,
        send_counter: SendCounterPacket,
    ) -> RequestCounterDirectoryCommandHandler {
        RequestCounterDirectoryCommandHandler {
            version,
            state,
            counter_directory,
            send_counter,
        }
    }
}

impl CommandHandler for RequestCounterDirectoryCommandHandler {
    fn family(&self) -> u32 {
        0
    }

    fn packet_id(&self) -> u32 {
        3
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn handle(&self, _packet: &Packet) -> Result<()> {
        match self.state.current_state() {
            ProfilingState::Active => self
                .send_counter
                .send_counter_directory_packet(&self.counter_directory),
            state => Err(Error::WrongState {
                operation: "request counter directory",
                state,
            }),
        }
    }
}
