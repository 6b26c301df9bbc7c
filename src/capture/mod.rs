//! Periodic counter sampling worker.


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backend::BackendRegistry;
use crate::counters::{CounterIdMap, CounterValueStore, Holder};
use crate::error::Error;
use crate::packet::FRAME_HEADER_LEN;
use crate::send::SendCounterPacket;
use crate::sys;

/// Shortest accepted capture period; smaller selections are clamped up.
pub const LOWEST_CAPTURE_PERIOD_US: u32 = 10_000;

struct Shared {
    holder: Arc<Holder>,
    values: Arc<CounterValueStore>,
    id_map: Arc<CounterIdMap>,
    backends: Arc<BackendRegistry>,
    send_counter: SendCounterPacket,
    running: AtomicBool,
}

/// Samples the selected counters at the selected period.
///
/// Each cycle snapshots the capture data, sleeps one period, then reads
/// every selected UID: counters owned by a backend are polled through their
/// backend context, the rest come from the shared value store. Readings go
/// out as periodic-capture packets, chunked to the pool's buffer capacity.
/// Stopping is cooperative; after [`stop`][PeriodicCounterCapture::stop]
/// returns no further packet is committed.
pub struct PeriodicCounterCapture {
    shared: Arc<Shared>,
    join: Mutex<Option<JoinHandle<()>>>,
    max_pairs_per_packet: usize,
}

impl PeriodicCounterCapture {
    pub fn new(
        holder: Arc<Holder>,
        values: Arc<CounterValueStore>,
        id_map: Arc<CounterIdMap>,
        backends: Arc<BackendRegistry>,
        send_counter: SendCounterPacket,
        buffer_capacity: usize,
    ) -> PeriodicCounterCapture {
        // timestamp + n * (uid, value) must fit one buffer.
        let max_pairs_per_packet = buffer_capacity.saturating_sub(FRAME_HEADER_LEN + 8) / 6;
        PeriodicCounterCapture {
            shared: Arc::new(Shared {
                holder,
                values,
                id_map,
                backends,
                send_counter,
                running: AtomicBool::new(false),
            }),
            join: Mutex::new(None),
            max_pairs_per_packet: max_pairs_per_packet.max(1),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let max_pairs = self.max_pairs_per_packet;
        let handle = std::thread::Builder::new()
            .name("profiling-capture".to_string())
            .spawn(move || capture_loop(&shared, max_pairs))
            .expect("spawning the capture thread");
        *self.join.lock().unwrap() = Some(handle);
    }

    /// Raises the stop flag and joins; bounded by one capture period.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.join.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                log::error!("capture thread panicked: {e:?}");
            }
        }
    }
}

fn capture_loop(shared: &Shared, max_pairs: usize) {
    while shared.running.load(Ordering::Acquire) {
        let data = shared.holder.capture_data();
        let period = data.capture_period_us.max(LOWEST_CAPTURE_PERIOD_US);
        std::thread::sleep(Duration::from_micros(u64::from(period)));
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        if data.counter_uids.is_empty() {
            continue;
        }

        let timestamp = sys::monotonic_micros();
        let mut readings = Vec::with_capacity(data.counter_uids.len());
        for uid in &data.counter_uids {
            match read_counter(shared, *uid) {
                Ok(value) => readings.push((*uid, value)),
                Err(e) => log::warn!("skipping counter UID {uid} in this sample: {e}"),
            }
        }

        for chunk in readings.chunks(max_pairs) {
            if let Err(e) = shared
                .send_counter
                .send_periodic_counter_capture_packet(timestamp, chunk)
            {
                // Backpressure: this sample is dropped, the next one may fit.
                log::warn!("dropping a periodic capture packet: {e}");
            }
        }
    }
}

fn read_counter(shared: &Shared, uid: u16) -> Result<u32, Error> {
    match shared.id_map.backend_id(uid) {
        Some((backend_id, local_id)) => match shared.backends.get(&backend_id) {
            Some(context) => context.read_counter_value(local_id),
            None => Err(Error::NotRegistered(format!("backend [{backend_id}]"))),
        },
        None => shared.values.get_absolute(uid),
    }
}
