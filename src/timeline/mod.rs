//! Causal timeline records and their packet encoders.
//!
//! A timeline stream is a DAG of entities, events, event classes, labels and
//! the relationships linking them, each serialized as a self-contained
//! framed packet. Encoders are pure functions over `(record, out)` returning
//! how many bytes they wrote or [`EncodeError::BufferExhaustion`] when the
//! slice is too small, which is what drives the writer's
//! commit-and-retry discipline.


pub mod well_known;

use crate::guid::Guid;
use crate::packet::wire::{string_len, OutOfSpace, Writer};
use crate::packet::{make_header, FRAME_HEADER_LEN};

/// Packet family carrying timeline traffic.
pub const TIMELINE_FAMILY: u32 = 1;

/// Packet id of the timeline message directory.
pub const MESSAGE_DIRECTORY_PACKET_ID: u32 = 0;

/// Packet id of every timeline record.
pub const MESSAGE_PACKET_ID: u32 = 1;

// Record declaration ids, as published by the message directory.
const DECL_LABEL: u32 = 0;
const DECL_ENTITY: u32 = 1;
const DECL_EVENT_CLASS: u32 = 2;
const DECL_RELATIONSHIP: u32 = 3;
const DECL_EVENT: u32 = 4;

/// How two timeline items relate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelationshipType {
    /// Head retains (owns) tail.
    RetentionLink,
    /// Head executes tail.
    ExecutionLink,
    /// Head feeds data to tail.
    DataLink,
    /// Head is labelled by tail.
    LabelLink,
}

impl RelationshipType {
    fn code(self) -> u32 {
        match self {
            RelationshipType::RetentionLink => 0,
            RelationshipType::ExecutionLink => 1,
            RelationshipType::DataLink => 2,
            RelationshipType::LabelLink => 3,
        }
    }
}

/// One record of the timeline stream.
#[derive(Clone, Debug, PartialEq)]
pub enum TimelineRecord {
    Entity {
        guid: Guid,
    },
    EventClass {
        guid: Guid,
    },
    Label {
        guid: Guid,
        label: String,
    },
    Relationship {
        ty: RelationshipType,
        relationship_guid: Guid,
        head_guid: Guid,
        tail_guid: Guid,
    },
    Event {
        timestamp: u64,
        thread_id: u64,
        guid: Guid,
    },
}

/// Why a record could not be encoded.
#[derive(Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// The output slice is too small; commit and retry with a fresh buffer.
    BufferExhaustion,
    /// The record itself is unencodable, retrying cannot help.
    Invalid(String),
}

impl From<OutOfSpace> for EncodeError {
    fn from(_: OutOfSpace) -> EncodeError {
        EncodeError::BufferExhaustion
    }
}

impl TimelineRecord {
    fn payload_len(&self) -> usize {
        4 + match self {
            TimelineRecord::Entity { .. } | TimelineRecord::EventClass { .. } => 8,
            TimelineRecord::Label { label, .. } => 8 + string_len(label),
            TimelineRecord::Relationship { .. } => 4 + 3 * 8,
            TimelineRecord::Event { .. } => 3 * 8,
        }
    }
}

/// Encodes `record` as one framed packet, returning the bytes written.
pub fn encode_record(record: &TimelineRecord, out: &mut [u8]) -> Result<usize, EncodeError> {
    if let TimelineRecord::Label { label, .. } = record {
        // Monitors consume labels as C strings.
        if label.contains('\0') {
            return Err(EncodeError::Invalid(format!(
                "label [{}] contains a NUL byte",
                label.escape_default()
            )));
        }
    }

    let mut writer = Writer::new(out);
    writer.write_u32(make_header(TIMELINE_FAMILY, MESSAGE_PACKET_ID))?;
    writer.write_u32(record.payload_len() as u32)?;
    match record {
        TimelineRecord::Entity { guid } => {
            writer.write_u32(DECL_ENTITY)?;
            writer.write_u64(guid.0)?;
        }
        TimelineRecord::EventClass { guid } => {
            writer.write_u32(DECL_EVENT_CLASS)?;
            writer.write_u64(guid.0)?;
        }
        TimelineRecord::Label { guid, label } => {
            writer.write_u32(DECL_LABEL)?;
            writer.write_u64(guid.0)?;
            writer.write_string(label)?;
        }
        TimelineRecord::Relationship {
            ty,
            relationship_guid,
            head_guid,
            tail_guid,
        } => {
            writer.write_u32(DECL_RELATIONSHIP)?;
            writer.write_u32(ty.code())?;
            writer.write_u64(relationship_guid.0)?;
            writer.write_u64(head_guid.0)?;
            writer.write_u64(tail_guid.0)?;
        }
        TimelineRecord::Event {
            timestamp,
            thread_id,
            guid,
        } => {
            writer.write_u32(DECL_EVENT)?;
            writer.write_u64(*timestamp)?;
            writer.write_u64(*thread_id)?;
            writer.write_u64(guid.0)?;
        }
    }
    Ok(writer.position())
}

// The directory describes each record declaration to the monitor: id, name
// and the argument layout of the serialized form.
const DIRECTORY_ENTRIES: [(u32, &str, &str, &str); 5] = [
    (DECL_LABEL, "declareLabel", "ps", "guid,value"),
    (DECL_ENTITY, "declareEntity", "p", "guid"),
    (DECL_EVENT_CLASS, "declareEventClass", "p", "guid"),
    (
        DECL_RELATIONSHIP,
        "declareRelationship",
        "Ippp",
        "relationshipType,relationshipGuid,headGuid,tailGuid",
    ),
    (DECL_EVENT, "declareEvent", "@tp", "timestamp,threadId,eventGuid"),
];

const STREAM_VERSION: u8 = 4;
const POINTER_BYTES: u8 = 8;
const THREAD_ID_BYTES: u8 = 8;

/// Encodes the timeline message directory as one framed packet.
///
/// The package is indivisible: it either fits the slice or fails with
/// [`EncodeError::BufferExhaustion`], there is no partial emission.
pub fn encode_message_directory(out: &mut [u8]) -> Result<usize, EncodeError> {
    let payload_len = 4
        + DIRECTORY_ENTRIES
            .iter()
            .map(|(_, name, args, arg_names)| {
                4 + string_len(name) + string_len(args) + string_len(arg_names)
            })
            .sum::<usize>();

    let mut writer = Writer::new(out);
    writer.write_u32(make_header(TIMELINE_FAMILY, MESSAGE_DIRECTORY_PACKET_ID))?;
    writer.write_u32(payload_len as u32)?;
    writer.write_u8(STREAM_VERSION)?;
    writer.write_u8(POINTER_BYTES)?;
    writer.write_u8(THREAD_ID_BYTES)?;
    writer.write_u8(0)?;
    for (id, name, args, arg_names) in DIRECTORY_ENTRIES {
        if !is_valid_decl_name(name) {
            return Err(EncodeError::Invalid(format!(
                "declaration name [{name}] is not a valid identifier"
            )));
        }
        writer.write_u32(id)?;
        writer.write_string(name)?;
        writer.write_string(args)?;
        writer.write_string(arg_names)?;
    }
    Ok(writer.position())
}

/// Upper bound on the frame any single record can need, labels aside.
pub fn max_fixed_record_len() -> usize {
    FRAME_HEADER_LEN + 4 + 4 + 3 * 8
}

fn is_valid_decl_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
