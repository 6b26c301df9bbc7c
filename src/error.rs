use std::time::Duration;

use thiserror::Error;

use crate::state::ProfilingState;

/// Errors surfaced by the profiling pipeline.
///
/// Every failure carries enough context to be actionable without a debugger:
/// the offending name or UID, the state an operation was attempted in, or the
/// packet key a dispatch failed on. The pipeline never aborts the host
/// process; fatal conditions terminate the affected worker thread and are
/// reported through the next [`update`][crate::service::ProfilingService::update].
#[derive(Debug, Error)]
pub enum Error {
    /// A bad field value reached a public boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A directory, value-store or id-map lookup missed.
    #[error("{0} is not registered")]
    NotRegistered(String),

    /// A registration collided with an existing entry.
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// An operation ran in a profiling state that does not allow it.
    #[error("{operation} is not allowed in profiling state [{state}]")]
    WrongState {
        operation: &'static str,
        state: ProfilingState,
    },

    /// The requested lifecycle transition is not in the legal-transition table.
    #[error("cannot transition from profiling state [{from}] to [{to}]")]
    InvalidTransition {
        from: ProfilingState,
        to: ProfilingState,
    },

    /// The buffer pool had no free buffer, or none large enough.
    #[error("buffer pool exhausted while reserving {requested} bytes")]
    BufferExhaustion { requested: usize },

    /// A packet payload could not be encoded even into an empty buffer.
    #[error("packet encoding failed: {0}")]
    Encoding(String),

    /// No handler is bound for the packet key.
    #[error("no handler registered for packet family {family}, id {id}, version {version:#x}")]
    UnknownPacket { family: u32, id: u32, version: u32 },

    /// A handler registration collided with an existing binding.
    #[error("a handler for packet family {family}, id {id}, version {version:#x} is already registered")]
    DuplicateHandler { family: u32, id: u32, version: u32 },

    /// A backend context refused an operation.
    #[error("backend [{backend}] refused the operation: {reason}")]
    Backend { backend: String, reason: String },

    /// A connection read or write failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A bounded wait expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
