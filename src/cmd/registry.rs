//! Handler registry keyed by `(family, packet id, version)`.


use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::packet::{Packet, PacketVersionResolver};

/// A typed handler for one inbound packet key.
///
/// Handlers are values behind a capability handle; invocation is synchronous
/// on the receive thread, so a handler that needs to do real work enqueues
/// it elsewhere.
pub trait CommandHandler: Send + Sync {
    fn family(&self) -> u32;
    fn packet_id(&self) -> u32;
    fn version(&self) -> u32;
    fn handle(&self, packet: &Packet) -> Result<()>;
}

/// Maps packet keys to handlers and dispatches inbound packets.
pub struct CommandHandlerRegistry {
    handlers: RwLock<HashMap<(u32, u32, u32), Arc<dyn CommandHandler>>>,
}

impl CommandHandlerRegistry {
    pub fn new() -> CommandHandlerRegistry {
        CommandHandlerRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Binds `handler` to its `(family, packet id, version)` key.
    pub fn register(&self, handler: Arc<dyn CommandHandler>) -> Result<()> {
        let key = (handler.family(), handler.packet_id(), handler.version());
        let mut handlers = self.handlers.write().unwrap();
        if handlers.contains_key(&key) {
            return Err(Error::DuplicateHandler {
                family: key.0,
                id: key.1,
                version: key.2,
            });
        }
        handlers.insert(key, handler);
        Ok(())
    }

    pub fn handler(&self, family: u32, packet_id: u32, version: u32) -> Option<Arc<dyn CommandHandler>> {
        self.handlers
            .read()
            .unwrap()
            .get(&(family, packet_id, version))
            .cloned()
    }

    /// Routes `packet` to the handler matching its key at the version the
    /// resolver reports.
    ///
    /// No lock is held across the handler invocation.
    pub fn dispatch(&self, packet: &Packet, resolver: &PacketVersionResolver) -> Result<()> {
        let family = packet.family();
        let packet_id = packet.packet_id();
        let version = resolver
            .resolve_packet_version(family, packet_id)
            .encoded();
        let handler =
            self.handler(family, packet_id, version)
                .ok_or(Error::UnknownPacket {
                    family,
                    id: packet_id,
                    version,
                })?;
        handler.handle(packet)
    }
}

impl Default for CommandHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
