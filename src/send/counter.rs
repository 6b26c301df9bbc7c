//! Encoders for the counter-side outbound packets: stream metadata, the
//! counter directory, periodic captures and the selection echo.

#[cfg(test)]
mod test;

use std::fs;
use std::sync::Arc;

use crate::buffer::BufferManager;
use crate::counters::CounterDirectory;
use crate::error::{Error, Result};
use crate::packet::wire::{string_len, OutOfSpace, Writer};
use crate::packet::{make_header, PacketVersionResolver, Version, FRAME_HEADER_LEN};
use crate::sys;

/// Identifies this producer on the wire.
const PIPE_MAGIC: u32 = 0x5049_5045;

pub const STREAM_METADATA_PACKET_ID: u32 = 0;
pub const COUNTER_DIRECTORY_PACKET_ID: u32 = 2;
pub const PERIODIC_SELECTION_PACKET_ID: u32 = 4;

/// Family and id of the periodic counter capture packet.
pub const CAPTURE_FAMILY: u32 = 3;
pub const CAPTURE_PACKET_ID: u32 = 0;

/// Packet keys announced in the stream-metadata packet, inbound and out.
const SUPPORTED_PACKETS: [(u32, u32); 11] = [
    (0, STREAM_METADATA_PACKET_ID),
    (0, 1),
    (0, COUNTER_DIRECTORY_PACKET_ID),
    (0, 3),
    (0, PERIODIC_SELECTION_PACKET_ID),
    (0, 5),
    (0, 6),
    (0, 7),
    (1, 0),
    (1, 1),
    (CAPTURE_FAMILY, CAPTURE_PACKET_ID),
];

/// Encodes counter packets straight into pool buffers.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct SendCounterPacket {
    buffer_manager: Arc<BufferManager>,
}

impl SendCounterPacket {
    pub fn new(buffer_manager: Arc<BufferManager>) -> SendCounterPacket {
        SendCounterPacket { buffer_manager }
    }

    fn encode(
        &self,
        needed: usize,
        encode: impl FnOnce(&mut Writer<'_>) -> Result<(), OutOfSpace>,
    ) -> Result<()> {
        let mut buffer = self.buffer_manager.reserve(needed)?;
        let outcome = {
            let mut writer = Writer::new(buffer.writable());
            encode(&mut writer).map(|()| writer.position())
        };
        match outcome {
            Ok(written) => self.buffer_manager.commit(buffer, written),
            Err(OutOfSpace) => {
                self.buffer_manager.release(buffer);
                Err(Error::Encoding(
                    "counter packet exceeded its computed size".into(),
                ))
            }
        }
    }

    /// First outbound packet of every connection: who we are, which clock
    /// we stamp with and which packets we speak.
    pub fn send_stream_metadata_packet(&self) -> Result<()> {
        let process = process_name();
        let software = env!("CARGO_PKG_VERSION");
        let hardware = std::env::consts::ARCH;
        let resolver = PacketVersionResolver;

        let payload_len = 4 * 3
            + 8
            + string_len(&process)
            + string_len(software)
            + string_len(hardware)
            + 4
            + SUPPORTED_PACKETS.len() * 8;

        self.encode(FRAME_HEADER_LEN + payload_len, |w| {
            w.write_u32(make_header(0, STREAM_METADATA_PACKET_ID))?;
            w.write_u32(payload_len as u32)?;
            w.write_u32(PIPE_MAGIC)?;
            w.write_u32(Version::new(1, 0, 0).encoded())?;
            w.write_u32(self.buffer_manager.buffer_capacity() as u32)?;
            w.write_u64(sys::monotonic_micros())?;
            w.write_string(&process)?;
            w.write_string(software)?;
            w.write_string(hardware)?;
            w.write_u32(SUPPORTED_PACKETS.len() as u32)?;
            for (family, id) in SUPPORTED_PACKETS {
                w.write_u32(make_header(family, id))?;
                w.write_u32(resolver.resolve_packet_version(family, id).encoded())?;
            }
            Ok(())
        })
    }

    /// Enumerates every registered category, device, counter set and
    /// counter.
    pub fn send_counter_directory_packet(&self, directory: &CounterDirectory) -> Result<()> {
        let devices = directory.devices();
        let counter_sets = directory.counter_sets();
        let categories = directory.categories();
        let counters = directory.counters();

        let mut payload_len = 4 * 2;
        for device in &devices {
            payload_len += 2 + 2 + string_len(&device.name);
        }
        for set in &counter_sets {
            payload_len += 2 + 2 + string_len(&set.name);
        }
        for category in &categories {
            payload_len +=
                string_len(&category.name) + 3 + 3 + 2 + 2 * category.counter_uids.len();
        }
        for counter in &counters {
            payload_len += 2 + 2 + 2 + 2 + 8 + 3 + 3
                + string_len(&counter.name)
                + string_len(&counter.description)
                + string_len(counter.units.as_deref().unwrap_or(""))
                + string_len(&counter.parent_category);
        }

        self.encode(FRAME_HEADER_LEN + payload_len, |w| {
            w.write_u32(make_header(0, COUNTER_DIRECTORY_PACKET_ID))?;
            w.write_u32(payload_len as u32)?;
            w.write_u16(devices.len() as u16)?;
            w.write_u16(counter_sets.len() as u16)?;
            w.write_u16(categories.len() as u16)?;
            w.write_u16(counters.len() as u16)?;
            for device in &devices {
                w.write_u16(device.uid)?;
                w.write_u16(device.cores)?;
                w.write_string(&device.name)?;
            }
            for set in &counter_sets {
                w.write_u16(set.uid)?;
                w.write_u16(set.count)?;
                w.write_string(&set.name)?;
            }
            for category in &categories {
                w.write_string(&category.name)?;
                w.write_optional_u16(category.device_uid)?;
                w.write_optional_u16(category.counter_set_uid)?;
                w.write_u16(category.counter_uids.len() as u16)?;
                for uid in &category.counter_uids {
                    w.write_u16(*uid)?;
                }
            }
            for counter in &counters {
                w.write_u16(counter.uid)?;
                w.write_u16(counter.max_uid)?;
                w.write_u16(counter.class)?;
                w.write_u16(counter.interpolation)?;
                w.write_f64(counter.multiplier)?;
                w.write_optional_u16(counter.device_uid)?;
                w.write_optional_u16(counter.counter_set_uid)?;
                w.write_string(&counter.name)?;
                w.write_string(&counter.description)?;
                w.write_string(counter.units.as_deref().unwrap_or(""))?;
                w.write_string(&counter.parent_category)?;
            }
            Ok(())
        })
    }

    /// One periodic sample: a timestamp and the selected `(uid, value)`
    /// readings.
    pub fn send_periodic_counter_capture_packet(
        &self,
        timestamp_us: u64,
        values: &[(u16, u32)],
    ) -> Result<()> {
        let payload_len = 8 + values.len() * 6;
        self.encode(FRAME_HEADER_LEN + payload_len, |w| {
            w.write_u32(make_header(CAPTURE_FAMILY, CAPTURE_PACKET_ID))?;
            w.write_u32(payload_len as u32)?;
            w.write_u64(timestamp_us)?;
            for (uid, value) in values {
                w.write_u16(*uid)?;
                w.write_u32(*value)?;
            }
            Ok(())
        })
    }

    /// Echo of an accepted periodic selection back to the monitor.
    pub fn send_periodic_counter_selection_packet(
        &self,
        period_us: u32,
        uids: &[u16],
    ) -> Result<()> {
        let payload_len = 4 + uids.len() * 2;
        self.encode(FRAME_HEADER_LEN + payload_len, |w| {
            w.write_u32(make_header(0, PERIODIC_SELECTION_PACKET_ID))?;
            w.write_u32(payload_len as u32)?;
            w.write_u32(period_us)?;
            for uid in uids {
                w.write_u16(*uid)?;
            }
            Ok(())
        })
    }
}

fn process_name() -> String {
    fs::read("/proc/self/cmdline")
        .ok()
        .and_then(|cmdline| {
            let first = cmdline.split(|b| *b == 0).next()?;
            let name = String::from_utf8_lossy(first).into_owned();
            (!name.is_empty()).then_some(name)
        })
        .unwrap_or_else(|| "unknown".to_string())
}
