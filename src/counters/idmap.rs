//! Mapping between backend-local counter ids and global UIDs.
//!
//! Backends number their counters from zero; the directory assigns global
//! UIDs. This map translates in both directions so a periodic selection can
//! be split per backend and backend readings can be reported under their
//! global UID.

#[cfg(test)]
mod test;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::backend::BackendId;
use crate::error::{Error, Result};

#[derive(Default)]
struct Inner {
    global_to_backend: HashMap<u16, (BackendId, u16)>,
    backend_to_global: HashMap<(BackendId, u16), u16>,
}

/// Bidirectional (backend id, local id) ↔ global UID map.
pub struct CounterIdMap {
    inner: RwLock<Inner>,
}

impl CounterIdMap {
    pub fn new() -> CounterIdMap {
        CounterIdMap {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn register(&self, backend_id: &BackendId, local_id: u16, global_id: u16) {
        let mut inner = self.inner.write().unwrap();
        inner
            .global_to_backend
            .insert(global_id, (backend_id.clone(), local_id));
        inner
            .backend_to_global
            .insert((backend_id.clone(), local_id), global_id);
    }

    pub fn global_id(&self, backend_id: &BackendId, local_id: u16) -> Result<u16> {
        self.inner
            .read()
            .unwrap()
            .backend_to_global
            .get(&(backend_id.clone(), local_id))
            .copied()
            .ok_or_else(|| {
                Error::NotRegistered(format!("counter {local_id} of backend [{backend_id}]"))
            })
    }

    /// Backend owning `global_id`, if any. Core counters are unmapped.
    pub fn backend_id(&self, global_id: u16) -> Option<(BackendId, u16)> {
        self.inner
            .read()
            .unwrap()
            .global_to_backend
            .get(&global_id)
            .cloned()
    }

    pub fn reset(&self) {
        *self.inner.write().unwrap() = Inner::default();
    }
}

impl Default for CounterIdMap {
    fn default() -> Self {
        Self::new()
    }
}
