//! Counter bookkeeping: the directory of registered counters, the dense
//! store of their atomic values, the backend id map and the capture
//! selection holder.

pub mod directory;
pub mod holder;
pub mod idmap;
pub mod values;

pub use directory::{Category, Counter, CounterDescriptor, CounterDirectory, CounterSet, Device};
pub use holder::{CaptureData, Holder};
pub use idmap::CounterIdMap;
pub use values::CounterValueStore;
