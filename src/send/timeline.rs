//! Buffered writer serializing timeline records into pool buffers.

#[cfg(test)]
mod test;

use std::sync::Arc;

use crate::buffer::{BufferManager, PacketBuffer};
use crate::error::{Error, Result};
use crate::guid::{Guid, GuidGenerator};
use crate::sys;
use crate::timeline::well_known;
use crate::timeline::{
    encode_message_directory, encode_record, max_fixed_record_len, EncodeError, RelationshipType,
    TimelineRecord,
};

/// Appends timeline records to a reserved buffer, committing and retrying
/// once when a record no longer fits.
///
/// Records accumulate in one buffer until [`commit`][TimelineWriter::commit]
/// publishes them, so a burst of related records costs one pool round-trip.
/// Each service caller owns its own writer; the pool serializes them.
pub struct TimelineWriter {
    buffer_manager: Arc<BufferManager>,
    buffer: Option<PacketBuffer>,
    offset: usize,
}

impl TimelineWriter {
    pub fn new(buffer_manager: Arc<BufferManager>) -> TimelineWriter {
        TimelineWriter {
            buffer_manager,
            buffer: None,
            offset: 0,
        }
    }

    fn reserve(&mut self) -> Result<()> {
        if self.buffer.is_none() {
            self.buffer = Some(self.buffer_manager.reserve(max_fixed_record_len())?);
            self.offset = 0;
        }
        Ok(())
    }

    /// Publishes everything appended so far; the next record starts a fresh
    /// buffer.
    pub fn commit(&mut self) -> Result<()> {
        if let Some(buffer) = self.buffer.take() {
            self.buffer_manager.commit(buffer, self.offset)?;
            self.offset = 0;
        }
        Ok(())
    }

    fn send_record(&mut self, record: &TimelineRecord) -> Result<()> {
        self.reserve()?;
        let buffer = self.buffer.as_mut().expect("reserved above");
        match encode_record(record, &mut buffer.writable()[self.offset..]) {
            Ok(written) => {
                self.offset += written;
                return Ok(());
            }
            Err(EncodeError::Invalid(reason)) => return Err(Error::Encoding(reason)),
            Err(EncodeError::BufferExhaustion) => {}
        }

        // The record no longer fits: publish what we have and retry exactly
        // once on an empty buffer.
        self.commit()?;
        self.reserve()?;
        let buffer = self.buffer.as_mut().expect("reserved above");
        match encode_record(record, buffer.writable()) {
            Ok(written) => {
                self.offset = written;
                Ok(())
            }
            Err(EncodeError::Invalid(reason)) => Err(Error::Encoding(reason)),
            Err(EncodeError::BufferExhaustion) => Err(Error::Encoding(
                "timeline record does not fit an empty buffer".into(),
            )),
        }
    }

    pub fn send_timeline_entity_packet(&mut self, guid: Guid) -> Result<()> {
        self.send_record(&TimelineRecord::Entity { guid })
    }

    pub fn send_timeline_event_class_packet(&mut self, guid: Guid) -> Result<()> {
        self.send_record(&TimelineRecord::EventClass { guid })
    }

    pub fn send_timeline_label_packet(
        &mut self,
        guid: Guid,
        label: &str,
    ) -> Result<()> {
        self.send_record(&TimelineRecord::Label {
            guid,
            label: label.to_string(),
        })
    }

    pub fn send_timeline_relationship_packet(
        &mut self,
        ty: RelationshipType,
        relationship_guid: Guid,
        head_guid: Guid,
        tail_guid: Guid,
    ) -> Result<()> {
        self.send_record(&TimelineRecord::Relationship {
            ty,
            relationship_guid,
            head_guid,
            tail_guid,
        })
    }

    pub fn send_timeline_event_packet(
        &mut self,
        timestamp: u64,
        thread_id: u64,
        guid: Guid,
    ) -> Result<()> {
        self.send_record(&TimelineRecord::Event {
            timestamp,
            thread_id,
            guid,
        })
    }

    /// Emits the timeline message directory as one indivisible package.
    ///
    /// No retry here: the directory either fits the reserved buffer or the
    /// whole call fails.
    pub fn send_timeline_message_directory_package(&mut self) -> Result<()> {
        self.reserve()?;
        let buffer = self.buffer.as_mut().expect("reserved above");
        match encode_message_directory(&mut buffer.writable()[self.offset..]) {
            Ok(written) => {
                self.offset += written;
                self.commit()
            }
            Err(_) => Err(Error::Encoding(
                "timeline message directory package did not fit".into(),
            )),
        }
    }

    /// Emits the well-known label and event-class baseline and commits it.
    pub fn send_well_known_labels_and_event_classes(&mut self) -> Result<()> {
        for (guid, text) in well_known::labels() {
            self.send_timeline_label_packet(guid, text)?;
        }
        for class in well_known::event_classes() {
            self.send_timeline_event_class_packet(class)?;
        }
        self.commit()
    }

    /// Declares an entity carrying a name label, returning the entity guid.
    pub fn declare_named_entity(
        &mut self,
        generator: &GuidGenerator,
        name: &str,
    ) -> Result<Guid> {
        let entity = generator.next_guid();
        self.send_timeline_entity_packet(entity)?;
        self.mark_entity_with_label(generator, entity, name, *well_known::NAME_LABEL)?;
        Ok(entity)
    }

    /// Attaches a label to an entity and types the link with `attribute`.
    pub fn mark_entity_with_label(
        &mut self,
        generator: &GuidGenerator,
        entity: Guid,
        label: &str,
        attribute: Guid,
    ) -> Result<()> {
        let label_guid = generator.static_guid(label);
        self.send_timeline_label_packet(label_guid, label)?;
        let link = generator.next_guid();
        self.send_timeline_relationship_packet(
            RelationshipType::LabelLink,
            link,
            entity,
            label_guid,
        )?;
        self.send_timeline_relationship_packet(
            RelationshipType::LabelLink,
            generator.next_guid(),
            link,
            attribute,
        )
    }

    /// Records an event of `event_class` on the calling thread, now.
    pub fn record_event(
        &mut self,
        generator: &GuidGenerator,
        event_class: Guid,
    ) -> Result<Guid> {
        let event = generator.next_guid();
        self.send_timeline_event_packet(sys::monotonic_micros(), sys::current_thread_id(), event)?;
        self.send_timeline_relationship_packet(
            RelationshipType::ExecutionLink,
            generator.next_guid(),
            event_class,
            event,
        )?;
        Ok(event)
    }
}

impl Drop for TimelineWriter {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            if self.offset > 0 {
                if let Err(e) = self.buffer_manager.commit(buffer, self.offset) {
                    log::warn!("dropping unflushed timeline records: {e}");
                }
            } else {
                self.buffer_manager.release(buffer);
            }
        }
    }
}
