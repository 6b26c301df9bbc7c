use std::sync::Arc;

use super::SendCounterPacket;
use crate::backend::BackendId;
use crate::buffer::BufferManager;
use crate::counters::{CounterDescriptor, CounterDirectory};
use crate::error::Error;
use crate::packet::wire::Reader;
use crate::packet::{Packet, Version};

fn drain_one(manager: &BufferManager) -> Packet {
    let buffer = manager.get_readable_buffer().expect("a committed buffer");
    let packets = crate::packet::split_frames(buffer.as_slice()).unwrap();
    manager.mark_read(buffer);
    assert_eq!(packets.len(), 1);
    packets.into_iter().next().unwrap()
}

#[test]
fn test_stream_metadata_packet() {
    let manager = Arc::new(BufferManager::default());
    let sender = SendCounterPacket::new(Arc::clone(&manager));

    sender.send_stream_metadata_packet().unwrap();
    let packet = drain_one(&manager);
    assert_eq!(packet.family(), 0);
    assert_eq!(packet.packet_id(), 0);

    let mut reader = Reader::new(packet.data());
    assert_eq!(reader.read_u32().unwrap(), 0x5049_5045);
    assert_eq!(
        Version::from_encoded(reader.read_u32().unwrap()),
        Version::new(1, 0, 0)
    );
    assert_eq!(reader.read_u32().unwrap() as usize, manager.buffer_capacity());
    reader.read_u64().unwrap(); // epoch
    reader.read_string().unwrap(); // process
    assert_eq!(reader.read_string().unwrap(), env!("CARGO_PKG_VERSION"));
    reader.read_string().unwrap(); // hardware
    let supported = reader.read_u32().unwrap();
    for _ in 0..supported {
        reader.read_u32().unwrap();
        reader.read_u32().unwrap();
    }
    assert!(reader.is_empty());
}

#[test]
fn test_counter_directory_packet() {
    let manager = Arc::new(BufferManager::default());
    let sender = SendCounterPacket::new(Arc::clone(&manager));

    let directory = CounterDirectory::new();
    directory.register_category("inference").unwrap();
    let device = directory.register_device("npu", 2, Some("inference")).unwrap();
    let counter = directory
        .register_counter(
            &BackendId::from("core"),
            0,
            "inference",
            CounterDescriptor {
                name: "jobs run".into(),
                description: "completed jobs".into(),
                units: Some("jobs".into()),
                multiplier: 1.0,
                device_uid: Some(device.uid),
                ..Default::default()
            },
        )
        .unwrap();

    sender.send_counter_directory_packet(&directory).unwrap();
    let packet = drain_one(&manager);
    assert_eq!(packet.family(), 0);
    assert_eq!(packet.packet_id(), 2);

    let mut reader = Reader::new(packet.data());
    assert_eq!(reader.read_u16().unwrap(), 1); // devices
    assert_eq!(reader.read_u16().unwrap(), 0); // counter sets
    assert_eq!(reader.read_u16().unwrap(), 1); // categories
    assert_eq!(reader.read_u16().unwrap(), 1); // counters

    assert_eq!(reader.read_u16().unwrap(), device.uid);
    assert_eq!(reader.read_u16().unwrap(), 2);
    assert_eq!(reader.read_string().unwrap(), "npu");

    assert_eq!(reader.read_string().unwrap(), "inference");
    assert_eq!(reader.read_optional_u16().unwrap(), Some(device.uid));
    assert_eq!(reader.read_optional_u16().unwrap(), None);
    assert_eq!(reader.read_u16().unwrap(), 1);
    assert_eq!(reader.read_u16().unwrap(), counter.uid);

    assert_eq!(reader.read_u16().unwrap(), counter.uid);
    assert_eq!(reader.read_u16().unwrap(), counter.max_uid);
    reader.read_u16().unwrap(); // class
    reader.read_u16().unwrap(); // interpolation
    assert_eq!(reader.read_f64().unwrap(), 1.0);
    assert_eq!(reader.read_optional_u16().unwrap(), Some(device.uid));
    assert_eq!(reader.read_optional_u16().unwrap(), None);
    assert_eq!(reader.read_string().unwrap(), "jobs run");
    assert_eq!(reader.read_string().unwrap(), "completed jobs");
    assert_eq!(reader.read_string().unwrap(), "jobs");
    assert_eq!(reader.read_string().unwrap(), "inference");
    assert!(reader.is_empty());
}

#[test]
fn test_periodic_capture_packet() {
    let manager = Arc::new(BufferManager::default());
    let sender = SendCounterPacket::new(Arc::clone(&manager));

    sender
        .send_periodic_counter_capture_packet(1_000_000, &[(7, 96), (9, 1)])
        .unwrap();
    let packet = drain_one(&manager);
    assert_eq!(packet.family(), 3);
    assert_eq!(packet.packet_id(), 0);

    let mut reader = Reader::new(packet.data());
    assert_eq!(reader.read_u64().unwrap(), 1_000_000);
    assert_eq!(reader.read_u16().unwrap(), 7);
    assert_eq!(reader.read_u32().unwrap(), 96);
    assert_eq!(reader.read_u16().unwrap(), 9);
    assert_eq!(reader.read_u32().unwrap(), 1);
    assert!(reader.is_empty());
}

#[test]
fn test_selection_echo_packet() {
    let manager = Arc::new(BufferManager::default());
    let sender = SendCounterPacket::new(Arc::clone(&manager));

    sender
        .send_periodic_counter_selection_packet(10_000, &[7, 9])
        .unwrap();
    let packet = drain_one(&manager);
    assert_eq!(packet.family(), 0);
    assert_eq!(packet.packet_id(), 4);

    let mut reader = Reader::new(packet.data());
    assert_eq!(reader.read_u32().unwrap(), 10_000);
    assert_eq!(reader.read_u16().unwrap(), 7);
    assert_eq!(reader.read_u16().unwrap(), 9);
    assert!(reader.is_empty());
}

#[test]
fn test_capture_packet_fails_when_pool_is_exhausted() {
    let manager = Arc::new(BufferManager::new(1, 64));
    let sender = SendCounterPacket::new(Arc::clone(&manager));

    let held = manager.reserve(1).unwrap();
    assert!(matches!(
        sender.send_periodic_counter_capture_packet(0, &[(1, 1)]),
        Err(Error::BufferExhaustion { .. })
    ));
    manager.release(held);
    sender
        .send_periodic_counter_capture_packet(0, &[(1, 1)])
        .unwrap();
}
