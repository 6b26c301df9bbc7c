use std::sync::Arc;

use super::TimelineWriter;
use crate::buffer::BufferManager;
use crate::guid::{Guid, GuidGenerator};
use crate::packet::{split_frames, Packet};
use crate::timeline::{well_known, MESSAGE_DIRECTORY_PACKET_ID, MESSAGE_PACKET_ID};

fn drain_packets(manager: &BufferManager) -> Vec<Packet> {
    let mut packets = Vec::new();
    while let Some(buffer) = manager.get_readable_buffer() {
        packets.extend(split_frames(buffer.as_slice()).unwrap());
        manager.mark_read(buffer);
    }
    packets
}

#[test]
fn test_records_accumulate_until_commit() {
    let manager = Arc::new(BufferManager::default());
    let mut writer = TimelineWriter::new(Arc::clone(&manager));

    writer.send_timeline_entity_packet(Guid(1)).unwrap();
    writer.send_timeline_event_class_packet(Guid(2)).unwrap();
    assert!(manager.get_readable_buffer().is_none(), "nothing before commit");

    writer.commit().unwrap();
    let packets = drain_packets(&manager);
    assert_eq!(packets.len(), 2);
    assert!(packets.iter().all(|p| p.packet_id() == MESSAGE_PACKET_ID));
}

#[test]
fn test_commit_without_records_is_a_no_op() {
    let manager = Arc::new(BufferManager::default());
    let mut writer = TimelineWriter::new(Arc::clone(&manager));
    writer.commit().unwrap();
    assert!(manager.get_readable_buffer().is_none());
}

#[test]
fn test_exhaustion_commits_and_retries_once() {
    // Buffers fit two entity records (20 bytes each) but not three.
    let manager = Arc::new(BufferManager::new(4, 56));
    let mut writer = TimelineWriter::new(Arc::clone(&manager));

    for raw in 0..5u64 {
        writer.send_timeline_entity_packet(Guid(raw)).unwrap();
    }
    writer.commit().unwrap();

    let packets = drain_packets(&manager);
    assert_eq!(packets.len(), 5);
    for (raw, packet) in packets.iter().enumerate() {
        let guid = u64::from_le_bytes(packet.data()[4..12].try_into().unwrap());
        assert_eq!(guid, raw as u64);
    }
}

#[test]
fn test_oversized_record_is_an_encoding_error() {
    let manager = Arc::new(BufferManager::new(2, 64));
    let mut writer = TimelineWriter::new(Arc::clone(&manager));

    let huge_label = "x".repeat(128);
    assert!(writer
        .send_timeline_label_packet(Guid(1), &huge_label)
        .is_err());
}

#[test]
fn test_message_directory_is_indivisible() {
    let manager = Arc::new(BufferManager::default());
    let mut writer = TimelineWriter::new(Arc::clone(&manager));
    writer.send_timeline_message_directory_package().unwrap();

    let packets = drain_packets(&manager);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].packet_id(), MESSAGE_DIRECTORY_PACKET_ID);

    // Too small a pool buffer: the package fails outright instead of
    // splitting.
    let small = Arc::new(BufferManager::new(2, 64));
    let mut writer = TimelineWriter::new(Arc::clone(&small));
    assert!(writer.send_timeline_message_directory_package().is_err());
}

#[test]
fn test_well_known_baseline() {
    let manager = Arc::new(BufferManager::default());
    let mut writer = TimelineWriter::new(Arc::clone(&manager));
    writer.send_well_known_labels_and_event_classes().unwrap();

    // Committed without an explicit commit() call.
    let packets = drain_packets(&manager);
    let labels = well_known::labels().len();
    let classes = well_known::event_classes().len();
    assert_eq!(packets.len(), labels + classes);
}

#[test]
fn test_declare_named_entity() {
    let manager = Arc::new(BufferManager::default());
    let generator = GuidGenerator::new();
    let mut writer = TimelineWriter::new(Arc::clone(&manager));

    let entity = writer.declare_named_entity(&generator, "graph 0").unwrap();
    assert!(!entity.is_static());
    writer.commit().unwrap();

    // Entity + label + two label links.
    let packets = drain_packets(&manager);
    assert_eq!(packets.len(), 4);
}

#[test]
fn test_drop_flushes_pending_records() {
    let manager = Arc::new(BufferManager::default());
    {
        let mut writer = TimelineWriter::new(Arc::clone(&manager));
        writer.send_timeline_entity_packet(Guid(9)).unwrap();
    }
    assert_eq!(drain_packets(&manager).len(), 1);
}
