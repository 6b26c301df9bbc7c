//! Handler for the Per-Job Counter Selection packet (family 0, id 5).

use std::sync::Arc;

use crate::cmd::CommandHandler;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::state::{ProfilingState, ProfilingStateMachine};

/// Reserved command: the packet is accepted and ignored.
pub struct PerJobCounterSelectionCommandHandler {
    version: u32,
    state: Arc<ProfilingStateMachine>,
}

impl PerJobCounterSelectionCommandHandler {
    pub(crate) fn new(
        version: u32,
        state: Arc<ProfilingStateMachine>,
    ) -> PerJobCounterSelectionCommandHandler {
        PerJobCounterSelectionCommandHandler { version, state }
    }
}

impl CommandHandler for PerJobCounterSelectionCommandHandler {
    fn family(&self) -> u32 {
        0
    }

    fn packet_id(&self) -> u32 {
        5
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn handle(&self, _packet: &Packet) -> Result<()> {
        match self.state.current_state() {
            ProfilingState::Active => Ok(()),
            state => Err(Error::WrongState {
                operation: "per-job counter selection",
                state,
            }),
        }
    }
}
