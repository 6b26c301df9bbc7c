//! Outbound pipeline: packet encoders feeding the buffer pool and the
//! consumer thread draining it onto the connection.

pub mod counter;
pub mod thread;
pub mod timeline;

pub use counter::SendCounterPacket;
pub use thread::SendThread;
pub use timeline::TimelineWriter;
