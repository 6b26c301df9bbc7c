//! The current periodic-capture selection, shared between the selection
//! handler and the capture worker.


use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::backend::BackendId;

/// Sampling period, selected counter UIDs and the backends involved.
#[derive(Clone, Debug, Default)]
pub struct CaptureData {
    pub capture_period_us: u32,
    pub counter_uids: Vec<u16>,
    pub active_backends: BTreeSet<BackendId>,
}

impl CaptureData {
    pub fn contains_counter(&self, uid: u16) -> bool {
        self.counter_uids.contains(&uid)
    }
}

/// Owns the capture data behind its lock; readers snapshot by value.
pub struct Holder {
    capture_data: Mutex<CaptureData>,
}

impl Holder {
    pub fn new() -> Holder {
        Holder {
            capture_data: Mutex::new(CaptureData::default()),
        }
    }

    pub fn capture_data(&self) -> CaptureData {
        self.capture_data.lock().unwrap().clone()
    }

    pub fn set_capture_data(
        &self,
        capture_period_us: u32,
        counter_uids: Vec<u16>,
        active_backends: BTreeSet<BackendId>,
    ) {
        let mut data = self.capture_data.lock().unwrap();
        data.capture_period_us = capture_period_us;
        data.counter_uids = counter_uids;
        data.active_backends = active_backends;
    }
}

impl Default for Holder {
    fn default() -> Self {
        Self::new()
    }
}
