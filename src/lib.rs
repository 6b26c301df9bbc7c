//! Profiling telemetry pipeline for an inference runtime.
//!
//! The pipeline exposes runtime instrumentation to an external monitor over
//! a binary packet protocol: atomic counter values sampled periodically, a
//! browsable counter directory, and a causal timeline of entities, events
//! and the relationships between them. The monitor drives everything with
//! command packets; the host only registers counters, bumps them, and calls
//! [`configure`](service::ProfilingService::configure) /
//! [`update`](service::ProfilingService::update).
//!
//! ## Example
//!
//! Register a counter, bump it from the workload path, and capture the
//! stream to a file:
//!
//! ```rust
//! use perf_pipe::backend::BackendId;
//! use perf_pipe::counters::CounterDescriptor;
//! use perf_pipe::service::{ProfilingOptions, ProfilingService};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let options = ProfilingOptions {
//!     enable_profiling: true,
//!     file_only: true,
//!     outgoing_capture_file: Some(dir.path().join("profiling.bin")),
//!     ..Default::default()
//! };
//!
//! let mut service = ProfilingService::new(options.clone());
//! service.counter_directory().register_category("inference").unwrap();
//! let counter = service
//!     .register_counter(
//!         &BackendId::from("core"),
//!         0,
//!         "inference",
//!         CounterDescriptor {
//!             name: "jobs run".into(),
//!             description: "completed inference jobs".into(),
//!             ..Default::default()
//!         },
//!     )
//!     .unwrap();
//!
//! // Drive the lifecycle: with a file transport this reaches WaitingForAck
//! // and the stream-metadata packet is on its way out.
//! service.configure(options, false).unwrap();
//!
//! // Caller threads mutate counters through the service.
//! service.increment_counter_value(counter.uid).unwrap();
//! assert_eq!(service.absolute_counter_value(counter.uid).unwrap(), 1);
//! ```

pub mod backend;
pub mod buffer;
pub mod capture;
pub mod cmd;
pub mod conn;
pub mod counters;
mod error;
pub mod guid;
pub mod handlers;
pub mod packet;
pub mod send;
pub mod service;
pub mod state;
mod sys;
pub mod timeline;

pub use error::{Error, Result};
