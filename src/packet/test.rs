use super::wire::{string_len, Reader, Writer};
use super::{make_header, split_frames, Packet, PacketVersionResolver, Version};

#[test]
fn test_header_round_trip() {
    for (family, id) in [(0, 1), (0, 7), (1, 1), (3, 0), (63, 1023)] {
        let packet = Packet::new(family, id, Vec::new());
        assert_eq!(packet.family(), family);
        assert_eq!(packet.packet_id(), id);
        assert_eq!(packet.class(), id >> 3);
        assert_eq!(packet.packet_type(), id & 7);
        assert_eq!(packet.length(), 0);
    }
}

#[test]
fn test_header_bit_layout() {
    // family 1, class 2, type 5 -> id = (2 << 3) | 5 = 21
    let header = make_header(1, 21);
    assert_eq!(header >> 26, 1);
    assert_eq!((header >> 19) & 0x7F, 2);
    assert_eq!((header >> 16) & 0x7, 5);
    assert_eq!(header & 0xFFFF, 0);
}

#[test]
fn test_read_from_stream() {
    let packet = Packet::new(0, 4, vec![1, 2, 3]);
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&packet.header().to_le_bytes());
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&[1, 2, 3]);

    let decoded = Packet::read_from(&mut bytes.as_slice()).unwrap();
    assert_eq!(decoded, packet);
}

#[test]
fn test_split_frames() {
    let a = Packet::new(0, 1, Vec::new());
    let b = Packet::new(1, 1, vec![9, 9, 9, 9]);
    let mut bytes = Vec::new();
    for p in [&a, &b] {
        bytes.extend_from_slice(&p.header().to_le_bytes());
        bytes.extend_from_slice(&p.length().to_le_bytes());
        bytes.extend_from_slice(p.data());
    }

    let packets = split_frames(&bytes).unwrap();
    assert_eq!(packets, vec![a, b]);

    assert!(split_frames(&bytes[..5]).is_err());
    assert!(split_frames(&bytes[..10]).is_err());
}

#[test]
fn test_version_encoding() {
    let version = Version::new(1, 2, 3);
    assert_eq!(version.encoded(), (1 << 22) | (2 << 12) | 3);
    assert_eq!(Version::from_encoded(version.encoded()), version);
    assert_eq!(version.to_string(), "1.2.3");
}

#[test]
fn test_version_resolver() {
    let resolver = PacketVersionResolver;
    assert_eq!(resolver.resolve_packet_version(0, 1), Version::new(1, 0, 0));
    assert_eq!(resolver.resolve_packet_version(0, 4), Version::new(1, 0, 0));
}

#[test]
fn test_wire_round_trip() {
    let mut buf = [0u8; 128];
    let mut writer = Writer::new(&mut buf);
    writer.write_u8(0xAB).unwrap();
    writer.write_u16(0xBEEF).unwrap();
    writer.write_u32(0xDEAD_BEEF).unwrap();
    writer.write_u64(u64::MAX - 1).unwrap();
    writer.write_f64(0.5).unwrap();
    writer.write_string("counter").unwrap();
    writer.write_optional_u16(Some(7)).unwrap();
    writer.write_optional_u16(None).unwrap();
    let written = writer.position();

    let mut reader = Reader::new(&buf[..written]);
    assert_eq!(reader.read_u8().unwrap(), 0xAB);
    assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
    assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
    assert_eq!(reader.read_u64().unwrap(), u64::MAX - 1);
    assert_eq!(reader.read_f64().unwrap(), 0.5);
    assert_eq!(reader.read_string().unwrap(), "counter");
    assert_eq!(reader.read_optional_u16().unwrap(), Some(7));
    assert_eq!(reader.read_optional_u16().unwrap(), None);
    assert!(reader.is_empty());
}

#[test]
fn test_strings_are_padded_to_four_bytes() {
    for (s, expected) in [("", 4), ("a", 8), ("abcd", 8), ("abcde", 12)] {
        assert_eq!(string_len(s), expected);
        let mut buf = [0u8; 16];
        let mut writer = Writer::new(&mut buf);
        writer.write_string(s).unwrap();
        assert_eq!(writer.position(), expected);
        assert_eq!(writer.position() % 4, 0);
    }
}

#[test]
fn test_writer_out_of_space() {
    let mut buf = [0u8; 3];
    let mut writer = Writer::new(&mut buf);
    assert!(writer.write_u32(1).is_err());
    // A failed write leaves the cursor untouched.
    assert_eq!(writer.position(), 0);
    writer.write_u16(1).unwrap();
}

#[test]
fn test_reader_truncated() {
    let mut reader = Reader::new(&[1, 2]);
    assert!(reader.read_u32().is_err());

    // String length running past the payload is rejected.
    let mut bad = Vec::new();
    bad.extend_from_slice(&100u32.to_le_bytes());
    bad.extend_from_slice(b"short");
    assert!(Reader::new(&bad).read_string().is_err());
}
