//! Dense map of counter UID to atomic value.
//!
//! Each registered UID owns one shared [`AtomicU32`] cell. The cell is
//! cloned out of the index (an [`Arc`]) so samplers and callers mutate the
//! same atomic without holding the index lock. All arithmetic is relaxed:
//! counters are incidental telemetry, not synchronization primitives.


use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Counter value storage, indexed by UID.
pub struct CounterValueStore {
    slots: RwLock<Vec<Option<Arc<AtomicU32>>>>,
}

impl CounterValueStore {
    pub fn new() -> CounterValueStore {
        CounterValueStore {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Creates the zero-valued cell for `uid`, growing the index as needed.
    ///
    /// Re-initializing an existing UID replaces its cell with a fresh zero.
    pub fn initialize(&self, uid: u16) {
        let mut slots = self.slots.write().unwrap();
        let index = usize::from(uid);
        if index >= slots.len() {
            slots.resize(index + 1, None);
        }
        slots[index] = Some(Arc::new(AtomicU32::new(0)));
    }

    pub fn is_registered(&self, uid: u16) -> bool {
        self.cell(uid).is_ok()
    }

    /// Shared handle to the atomic cell behind `uid`.
    pub fn cell(&self, uid: u16) -> Result<Arc<AtomicU32>> {
        self.slots
            .read()
            .unwrap()
            .get(usize::from(uid))
            .and_then(|slot| slot.clone())
            .ok_or_else(|| Error::NotRegistered(format!("counter UID {uid}")))
    }

    pub fn get_absolute(&self, uid: u16) -> Result<u32> {
        Ok(self.cell(uid)?.load(Ordering::Relaxed))
    }

    /// Reads the current value and subtracts it back in, so consecutive
    /// delta reads report what accumulated in between.
    pub fn get_delta(&self, uid: u16) -> Result<u32> {
        let cell = self.cell(uid)?;
        let value = cell.load(Ordering::Relaxed);
        cell.fetch_sub(value, Ordering::Relaxed);
        Ok(value)
    }

    pub fn set(&self, uid: u16, value: u32) -> Result<()> {
        self.cell(uid)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Adds `value`, returning the previous value.
    pub fn add(&self, uid: u16, value: u32) -> Result<u32> {
        Ok(self.cell(uid)?.fetch_add(value, Ordering::Relaxed))
    }

    /// Subtracts `value`, returning the previous value.
    pub fn subtract(&self, uid: u16, value: u32) -> Result<u32> {
        Ok(self.cell(uid)?.fetch_sub(value, Ordering::Relaxed))
    }

    /// Adds one, returning the previous value.
    pub fn increment(&self, uid: u16) -> Result<u32> {
        Ok(self.cell(uid)?.fetch_add(1, Ordering::Relaxed))
    }

    /// Drops every cell. Only valid during a full service reset.
    pub fn reset(&self) {
        self.slots.write().unwrap().clear();
    }
}

impl Default for CounterValueStore {
    fn default() -> Self {
        Self::new()
    }
}
