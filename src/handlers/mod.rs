//! Handlers for the inbound command packets.
//!
//! Every handler gates on the current profiling state first: outside its
//! allowed states it fails with a wrong-state error and mutates nothing,
//! which the receive loop treats as fatal. The `(family, id)` re-validation
//! inside some handlers duplicates what the dispatcher already matched on;
//! it is kept as a defensive check against a miswired registry.


pub mod ack;
pub mod counter_dir;
pub mod per_job;
pub mod periodic;
pub mod timeline_toggle;

pub use ack::ConnectionAcknowledgedCommandHandler;
pub use counter_dir::RequestCounterDirectoryCommandHandler;
pub use per_job::PerJobCounterSelectionCommandHandler;
pub use periodic::PeriodicCounterSelectionCommandHandler;
pub use timeline_toggle::{
    ActivateTimelineReportingCommandHandler, DeactivateTimelineReportingCommandHandler,
};
