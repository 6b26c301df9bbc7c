//! Registry of categories, devices, counter sets and counters.
//!
//! The directory assigns UIDs from one monotonically increasing pool shared
//! by devices, counter sets and counters; UIDs are never reused and the
//! space is capped at `u16::MAX`. A counter spanning multiple cores reserves
//! one UID per core, `[uid ..= max_uid]`, and is addressable through any of
//! them.

#[cfg(test)]
mod test;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::backend::BackendId;
use crate::error::{Error, Result};

/// Top-level grouping of counters, e.g. one per subsystem.
#[derive(Clone, Debug)]
pub struct Category {
    pub name: String,
    /// Every UID reserved by counters registered under this category.
    pub counter_uids: Vec<u16>,
    pub device_uid: Option<u16>,
    pub counter_set_uid: Option<u16>,
}

/// A physical or logical device counters can be tied to.
#[derive(Clone, Debug)]
pub struct Device {
    pub name: String,
    pub uid: u16,
    pub cores: u16,
}

/// A named set grouping related counters.
#[derive(Clone, Debug)]
pub struct CounterSet {
    pub name: String,
    pub uid: u16,
    pub count: u16,
}

/// A registered counter.
#[derive(Clone, Debug)]
pub struct Counter {
    pub backend_id: BackendId,
    /// First UID reserved for this counter.
    pub uid: u16,
    /// Last reserved UID; equals `uid` unless the counter spans cores.
    pub max_uid: u16,
    pub class: u16,
    pub interpolation: u16,
    pub multiplier: f64,
    pub name: String,
    pub description: String,
    pub units: Option<String>,
    pub parent_category: String,
    pub device_uid: Option<u16>,
    pub counter_set_uid: Option<u16>,
}

impl Counter {
    /// Number of UIDs reserved by this counter.
    pub fn cores(&self) -> u16 {
        self.max_uid - self.uid + 1
    }
}

/// Everything about a counter except its identity and placement.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CounterDescriptor {
    pub name: String,
    pub description: String,
    pub units: Option<String>,
    pub class: u16,
    pub interpolation: u16,
    pub multiplier: f64,
    /// When > 1, one UID is reserved per core.
    pub cores: Option<u16>,
    pub device_uid: Option<u16>,
    pub counter_set_uid: Option<u16>,
}

impl Default for CounterDescriptor {
    fn default() -> Self {
        CounterDescriptor {
            name: String::new(),
            description: String::new(),
            units: None,
            class: 0,
            interpolation: 0,
            multiplier: 1.0,
            cores: None,
            device_uid: None,
            counter_set_uid: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    categories: BTreeMap<String, Arc<Category>>,
    devices: BTreeMap<u16, Arc<Device>>,
    counter_sets: BTreeMap<u16, Arc<CounterSet>>,
    /// Counters keyed by their first reserved UID.
    counters: BTreeMap<u16, Arc<Counter>>,
    next_uid: u32,
}

impl Inner {
    fn take_uids(&mut self, requested: u16, count: u16) -> Result<(u16, u16)> {
        let first = u32::from(requested).max(self.next_uid);
        let last = first + u32::from(count) - 1;
        if last > u32::from(u16::MAX) {
            return Err(Error::InvalidArgument(format!(
                "counter UID space exhausted: {count} UIDs requested at {first}"
            )));
        }
        self.next_uid = last + 1;
        Ok((first as u16, last as u16))
    }

    fn counter_by_uid(&self, uid: u16) -> Option<&Arc<Counter>> {
        // Counters are keyed by their first UID; a multi-core counter also
        // answers for every UID up to max_uid.
        self.counters
            .range(..=uid)
            .next_back()
            .map(|(_, c)| c)
            .filter(|c| uid <= c.max_uid)
    }
}

/// Thread-safe counter directory.
///
/// One reader-writer lock guards the whole registry: registrations are
/// writes, lookups are reads. Entries are handed out as [`Arc`] snapshots;
/// a snapshot taken before a later registration does not reflect it.
pub struct CounterDirectory {
    inner: RwLock<Inner>,
}

impl CounterDirectory {
    pub fn new() -> CounterDirectory {
        CounterDirectory {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Registers a new category.
    pub fn register_category(&self, name: &str) -> Result<Arc<Category>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("category name is empty".into()));
        }

        let mut inner = self.inner.write().unwrap();
        if inner.categories.contains_key(name) {
            return Err(Error::AlreadyRegistered(format!("category [{name}]")));
        }
        let category = Arc::new(Category {
            name: name.to_string(),
            counter_uids: Vec::new(),
            device_uid: None,
            counter_set_uid: None,
        });
        inner.categories.insert(name.to_string(), Arc::clone(&category));
        Ok(category)
    }

    /// Registers a new device, optionally linking it to a parent category.
    pub fn register_device(
        &self,
        name: &str,
        cores: u16,
        parent_category: Option<&str>,
    ) -> Result<Arc<Device>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("device name is empty".into()));
        }

        let mut inner = self.inner.write().unwrap();
        if inner.devices.values().any(|d| d.name == name) {
            return Err(Error::AlreadyRegistered(format!("device [{name}]")));
        }
        if let Some(category) = parent_category {
            if !inner.categories.contains_key(category) {
                return Err(Error::NotRegistered(format!("category [{category}]")));
            }
        }

        let (uid, _) = inner.take_uids(0, 1)?;
        let device = Arc::new(Device {
            name: name.to_string(),
            uid,
            cores,
        });
        inner.devices.insert(uid, Arc::clone(&device));

        if let Some(entry) = parent_category.and_then(|c| inner.categories.get_mut(c)) {
            Arc::make_mut(entry).device_uid = Some(uid);
        }
        Ok(device)
    }

    /// Registers a new counter set, optionally linking it to a parent category.
    pub fn register_counter_set(
        &self,
        name: &str,
        count: u16,
        parent_category: Option<&str>,
    ) -> Result<Arc<CounterSet>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("counter set name is empty".into()));
        }

        let mut inner = self.inner.write().unwrap();
        if inner.counter_sets.values().any(|s| s.name == name) {
            return Err(Error::AlreadyRegistered(format!("counter set [{name}]")));
        }
        if let Some(category) = parent_category {
            if !inner.categories.contains_key(category) {
                return Err(Error::NotRegistered(format!("category [{category}]")));
            }
        }

        let (uid, _) = inner.take_uids(0, 1)?;
        let counter_set = Arc::new(CounterSet {
            name: name.to_string(),
            uid,
            count,
        });
        inner.counter_sets.insert(uid, Arc::clone(&counter_set));

        if let Some(entry) = parent_category.and_then(|c| inner.categories.get_mut(c)) {
            Arc::make_mut(entry).counter_set_uid = Some(uid);
        }
        Ok(counter_set)
    }

    /// Registers a new counter under `parent_category`.
    ///
    /// `requested_uid` is a placement hint: the counter lands on the first
    /// unassigned UID at or above it. A counter with `cores` > 1 reserves one
    /// UID per core; the returned entry reports the reserved range as
    /// `uid ..= max_uid`.
    pub fn register_counter(
        &self,
        backend_id: &BackendId,
        requested_uid: u16,
        parent_category: &str,
        descriptor: CounterDescriptor,
    ) -> Result<Arc<Counter>> {
        if descriptor.name.is_empty() {
            return Err(Error::InvalidArgument("counter name is empty".into()));
        }
        if descriptor.description.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "counter [{}] has an empty description",
                descriptor.name
            )));
        }
        if !(descriptor.multiplier > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "counter [{}] multiplier must be > 0, got {}",
                descriptor.name, descriptor.multiplier
            )));
        }
        if descriptor.cores == Some(0) {
            return Err(Error::InvalidArgument(format!(
                "counter [{}] core count must be > 0",
                descriptor.name
            )));
        }

        let mut inner = self.inner.write().unwrap();
        if !inner.categories.contains_key(parent_category) {
            return Err(Error::NotRegistered(format!("category [{parent_category}]")));
        }
        if inner.counters.values().any(|c| c.name == descriptor.name) {
            return Err(Error::AlreadyRegistered(format!(
                "counter [{}]",
                descriptor.name
            )));
        }
        if let Some(device_uid) = descriptor.device_uid {
            if !inner.devices.contains_key(&device_uid) {
                return Err(Error::NotRegistered(format!("device UID {device_uid}")));
            }
        }
        if let Some(set_uid) = descriptor.counter_set_uid {
            if !inner.counter_sets.contains_key(&set_uid) {
                return Err(Error::NotRegistered(format!("counter set UID {set_uid}")));
            }
        }

        let cores = descriptor.cores.unwrap_or(1);
        let (uid, max_uid) = inner.take_uids(requested_uid, cores)?;
        let counter = Arc::new(Counter {
            backend_id: backend_id.clone(),
            uid,
            max_uid,
            class: descriptor.class,
            interpolation: descriptor.interpolation,
            multiplier: descriptor.multiplier,
            name: descriptor.name,
            description: descriptor.description,
            units: descriptor.units,
            parent_category: parent_category.to_string(),
            device_uid: descriptor.device_uid,
            counter_set_uid: descriptor.counter_set_uid,
        });
        inner.counters.insert(uid, Arc::clone(&counter));

        if let Some(entry) = inner.categories.get_mut(parent_category) {
            Arc::make_mut(entry).counter_uids.extend(uid..=max_uid);
        }

        Ok(counter)
    }

    pub fn category(&self, name: &str) -> Option<Arc<Category>> {
        self.inner.read().unwrap().categories.get(name).cloned()
    }

    pub fn device(&self, uid: u16) -> Option<Arc<Device>> {
        self.inner.read().unwrap().devices.get(&uid).cloned()
    }

    pub fn device_by_name(&self, name: &str) -> Option<Arc<Device>> {
        self.inner
            .read()
            .unwrap()
            .devices
            .values()
            .find(|d| d.name == name)
            .cloned()
    }

    pub fn counter_set(&self, uid: u16) -> Option<Arc<CounterSet>> {
        self.inner.read().unwrap().counter_sets.get(&uid).cloned()
    }

    pub fn counter_set_by_name(&self, name: &str) -> Option<Arc<CounterSet>> {
        self.inner
            .read()
            .unwrap()
            .counter_sets
            .values()
            .find(|s| s.name == name)
            .cloned()
    }

    /// Looks a counter up by any UID in its reserved range.
    pub fn counter(&self, uid: u16) -> Option<Arc<Counter>> {
        self.inner.read().unwrap().counter_by_uid(uid).cloned()
    }

    pub fn counter_by_name(&self, name: &str) -> Option<Arc<Counter>> {
        self.inner
            .read()
            .unwrap()
            .counters
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn is_category_registered(&self, name: &str) -> bool {
        self.inner.read().unwrap().categories.contains_key(name)
    }

    pub fn is_counter_registered(&self, uid: u16) -> bool {
        self.inner.read().unwrap().counter_by_uid(uid).is_some()
    }

    pub fn is_counter_name_registered(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .counters
            .values()
            .any(|c| c.name == name)
    }

    pub fn category_count(&self) -> u16 {
        self.inner.read().unwrap().categories.len() as u16
    }

    pub fn device_count(&self) -> u16 {
        self.inner.read().unwrap().devices.len() as u16
    }

    pub fn counter_set_count(&self) -> u16 {
        self.inner.read().unwrap().counter_sets.len() as u16
    }

    pub fn counter_count(&self) -> u16 {
        self.inner.read().unwrap().counters.len() as u16
    }

    /// Snapshot of all categories, in name order.
    pub fn categories(&self) -> Vec<Arc<Category>> {
        self.inner.read().unwrap().categories.values().cloned().collect()
    }

    /// Snapshot of all devices, in UID order.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.read().unwrap().devices.values().cloned().collect()
    }

    /// Snapshot of all counter sets, in UID order.
    pub fn counter_sets(&self) -> Vec<Arc<CounterSet>> {
        self.inner.read().unwrap().counter_sets.values().cloned().collect()
    }

    /// Snapshot of all counters, in UID order.
    pub fn counters(&self) -> Vec<Arc<Counter>> {
        self.inner.read().unwrap().counters.values().cloned().collect()
    }

    /// Drops every entry and restarts the UID pool. Only valid during a full
    /// service reset.
    pub fn clear(&self) {
        *self.inner.write().unwrap() = Inner::default();
    }
}

impl Default for CounterDirectory {
    fn default() -> Self {
        Self::new()
    }
}
