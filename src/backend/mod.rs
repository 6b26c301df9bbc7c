//! Pluggable backend contexts.
//!
//! A backend owns part of the counter namespace and reacts to profiling
//! lifecycle changes. The service stores one context per [`BackendId`],
//! registers their counters into the shared UID space and fans out
//! enable/disable notifications.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::Result;

/// Identifier of a backend context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackendId(String);

impl BackendId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> BackendId {
        BackendId(id.to_string())
    }
}

impl From<String> for BackendId {
    fn from(id: String) -> BackendId {
        BackendId(id)
    }
}

impl Borrow<str> for BackendId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hooks a backend exposes to the profiling service.
///
/// Counter UIDs passed to [`activate_counters`] and
/// [`read_counter_value`] are the backend's *local* ids; the service
/// translates between local ids and global UIDs through the counter id map.
///
/// [`activate_counters`]: BackendContext::activate_counters
/// [`read_counter_value`]: BackendContext::read_counter_value
pub trait BackendContext: Send + Sync {
    /// Registers this backend's counters into the shared namespace.
    ///
    /// `first_free_uid` is the first unclaimed global UID; the backend
    /// returns the new high-water mark after its registrations.
    fn register_counters(&self, first_free_uid: u16) -> u16;

    /// Turns profiling on or off for this backend.
    fn enable_profiling(&self, enabled: bool) -> Result<()>;

    /// Notifies the backend that timeline reporting was toggled.
    fn enable_timeline_reporting(&self, enabled: bool);

    /// Hands the backend its share of a periodic counter selection.
    fn activate_counters(&self, capture_period_us: u32, counter_ids: Vec<u16>);

    /// Clears any active per-backend counter selection.
    fn deactivate_counters(&self);

    /// Reads the current value of one backend-owned counter.
    fn read_counter_value(&self, counter_id: u16) -> Result<u32>;
}

/// Backend contexts keyed by id.
///
/// Written during registration (before the service goes `Active`), cleared
/// only during a full reset; reads in between are uncontended.
pub struct BackendRegistry {
    contexts: RwLock<BTreeMap<BackendId, Arc<dyn BackendContext>>>,
}

impl BackendRegistry {
    pub fn new() -> BackendRegistry {
        BackendRegistry {
            contexts: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, id: BackendId, context: Arc<dyn BackendContext>) {
        self.contexts.write().unwrap().insert(id, context);
    }

    pub fn get(&self, id: &BackendId) -> Option<Arc<dyn BackendContext>> {
        self.contexts.read().unwrap().get(id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().unwrap().is_empty()
    }

    /// Snapshot of all registered contexts, in id order.
    pub fn all(&self) -> Vec<(BackendId, Arc<dyn BackendContext>)> {
        self.contexts
            .read()
            .unwrap()
            .iter()
            .map(|(id, ctx)| (id.clone(), Arc::clone(ctx)))
            .collect()
    }

    pub fn clear(&self) {
        self.contexts.write().unwrap().clear();
    }

    /// Tells every backend the timeline flag changed.
    pub fn notify_timeline_reporting(&self, enabled: bool) {
        for (_, context) in self.all() {
            context.enable_timeline_reporting(enabled);
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
