//! Handler for the Periodic Counter Selection packet (family 0, id 4).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::backend::BackendRegistry;
use crate::capture::{PeriodicCounterCapture, LOWEST_CAPTURE_PERIOD_US};
use crate::cmd::CommandHandler;
use crate::counters::{CounterDirectory, CounterIdMap, Holder};
use crate::error::{Error, Result};
use crate::packet::wire::Reader;
use crate::packet::Packet;
use crate::send::SendCounterPacket;
use crate::state::{ProfilingState, ProfilingStateMachine};

/// Applies a new periodic selection.
///
/// The payload is a period in microseconds followed by the selected counter
/// UIDs. Duplicates and unregistered UIDs are dropped, backend-owned UIDs
/// are routed to their backend context, the capture data is swapped under
/// its lock and the worker is started or, for an empty selection, stopped.
/// The accepted selection is echoed back to the monitor.
pub struct PeriodicCounterSelectionCommandHandler {
    version: u32,
    state: Arc<ProfilingStateMachine>,
    counter_directory: Arc<CounterDirectory>,
    id_map: Arc<CounterIdMap>,
    holder: Arc<Holder>,
    capture: Arc<PeriodicCounterCapture>,
    backends: Arc<BackendRegistry>,
    send_counter: SendCounterPacket,
}

impl PeriodicCounterSelectionCommandHandler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        version: u32,
        state: Arc<ProfilingStateMachine>,
        counter_directory: Arc<CounterDirectory>,
        id_map: Arc<CounterIdMap>,
        holder: Arc<Holder>,
        capture: Arc<PeriodicCounterCapture>,
        backends: Arc<BackendRegistry>,
        send_counter: SendCounterPacket,
    ) -> PeriodicCounterSelectionCommandHandler {
        PeriodicCounterSelectionCommandHandler {
            version,
            state,
            counter_directory,
            id_map,
            holder,
            capture,
            backends,
            send_counter,
        }
    }

    fn parse(&self, packet: &Packet) -> Result<(u32, Vec<u16>)> {
        let mut reader = Reader::new(packet.data());
        let period_us = reader.read_u32()?;
        if reader.remaining() % 2 != 0 {
            return Err(Error::InvalidArgument(
                "periodic selection payload has a trailing byte".into(),
            ));
        }
        let mut seen = HashSet::new();
        let mut uids = Vec::with_capacity(reader.remaining() / 2);
        while !reader.is_empty() {
            let uid = reader.read_u16()?;
            if seen.insert(uid) {
                uids.push(uid);
            }
        }
        Ok((period_us, uids))
    }
}

impl CommandHandler for PeriodicCounterSelectionCommandHandler {
    fn family(&self) -> u32 {
        0
    }

    fn packet_id(&self) -> u32 {
        4
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn handle(&self, packet: &Packet) -> Result<()> {
        match self.state.current_state() {
            ProfilingState::Active => {}
            state => {
                return Err(Error::WrongState {
                    operation: "periodic counter selection",
                    state,
                })
            }
        }

        let (requested_period, uids) = self.parse(packet)?;
        // A zero period keeps the configured default.
        let period_us = if requested_period == 0 {
            self.holder.capture_data().capture_period_us
        } else {
            requested_period
        }
        .max(LOWEST_CAPTURE_PERIOD_US);

        // Keep only registered counters, splitting out the backend-owned
        // ones so each backend receives its share under its local ids.
        let mut selected = Vec::with_capacity(uids.len());
        let mut per_backend: BTreeMap<_, Vec<u16>> = BTreeMap::new();
        for uid in uids {
            match self.id_map.backend_id(uid) {
                Some((backend_id, local_id)) => {
                    selected.push(uid);
                    per_backend.entry(backend_id).or_default().push(local_id);
                }
                None if self.counter_directory.is_counter_registered(uid) => selected.push(uid),
                None => log::debug!("dropping unregistered counter UID {uid} from the selection"),
            }
        }

        let active_backends: BTreeSet<_> = per_backend.keys().cloned().collect();
        self.holder
            .set_capture_data(period_us, selected.clone(), active_backends);

        for (backend_id, context) in self.backends.all() {
            match per_backend.remove(&backend_id) {
                Some(local_ids) => context.activate_counters(period_us, local_ids),
                None => context.deactivate_counters(),
            }
        }

        if selected.is_empty() {
            self.capture.stop();
        } else {
            self.capture.start();
        }

        self.send_counter
            .send_periodic_counter_selection_packet(period_us, &selected)
    }
}
