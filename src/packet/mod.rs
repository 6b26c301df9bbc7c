//! Wire packet framing.
//!
//! Every packet is a 32-bit header, a 32-bit payload length and `length`
//! payload bytes. The header packs the packet family into bits 26..31, the
//! class into bits 19..25 and the type into bits 16..18; bits 0..15 are
//! reserved. The *packet id* collapses class and type into
//! `(class << 3) | type`. All multi-byte payload values are little-endian.

#[cfg(test)]
mod test;

pub mod wire;

use std::fmt;
use std::io::Read;

use crate::error::{Error, Result};

/// Bytes of header + length preceding every payload.
pub const FRAME_HEADER_LEN: usize = 8;

/// Packs a packet header from its family and id.
pub fn make_header(family: u32, packet_id: u32) -> u32 {
    ((family & 0x3F) << 26) | ((packet_id & 0x3FF) << 16)
}

/// A framed packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    header: u32,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(family: u32, packet_id: u32, payload: Vec<u8>) -> Packet {
        Packet {
            header: make_header(family, packet_id),
            payload,
        }
    }

    pub fn from_header(header: u32, payload: Vec<u8>) -> Packet {
        Packet { header, payload }
    }

    pub fn header(&self) -> u32 {
        self.header
    }

    pub fn family(&self) -> u32 {
        self.header >> 26
    }

    pub fn packet_id(&self) -> u32 {
        (self.header >> 16) & 0x3FF
    }

    pub fn class(&self) -> u32 {
        self.packet_id() >> 3
    }

    pub fn packet_type(&self) -> u32 {
        self.packet_id() & 0x7
    }

    pub fn length(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    /// Serialized size of the packet including its frame.
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    /// Reads one framed packet off a byte stream.
    pub fn read_from(reader: &mut impl Read) -> Result<Packet> {
        let mut frame = [0u8; FRAME_HEADER_LEN];
        reader.read_exact(&mut frame)?;
        let header = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let length = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        Ok(Packet { header, payload })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packet family {} id {} ({} bytes)",
            self.family(),
            self.packet_id(),
            self.length()
        )
    }
}

/// Splits a byte slice holding consecutive framed packets.
///
/// Used to duplicate an outbound buffer to local packet handlers.
pub fn split_frames(mut data: &[u8]) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    while !data.is_empty() {
        if data.len() < FRAME_HEADER_LEN {
            return Err(Error::Encoding("truncated packet frame".into()));
        }
        let header = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        if data.len() < FRAME_HEADER_LEN + length {
            return Err(Error::Encoding("truncated packet payload".into()));
        }
        packets.push(Packet {
            header,
            payload: data[FRAME_HEADER_LEN..FRAME_HEADER_LEN + length].to_vec(),
        });
        data = &data[FRAME_HEADER_LEN + length..];
    }
    Ok(packets)
}

/// Packet-format version, packed as `major << 22 | minor << 12 | patch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Version {
        Version { major, minor, patch }
    }

    pub fn encoded(self) -> u32 {
        ((self.major & 0x3FF) << 22) | ((self.minor & 0x3FF) << 12) | (self.patch & 0xFFF)
    }

    pub fn from_encoded(raw: u32) -> Version {
        Version {
            major: (raw >> 22) & 0x3FF,
            minor: (raw >> 12) & 0x3FF,
            patch: raw & 0xFFF,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Resolves the encoded version a packet key is spoken at.
///
/// Every packet in the command family is currently at 1.0.0; the resolver
/// exists so individual ids can move independently later.
#[derive(Clone, Copy, Debug, Default)]
pub struct PacketVersionResolver;

impl PacketVersionResolver {
    pub fn resolve_packet_version(&self, _family: u32, _packet_id: u32) -> Version {
        Version::new(1, 0, 0)
    }
}
