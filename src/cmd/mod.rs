//! Inbound command handling: the handler registry and the receive loop.

pub mod receiver;
pub mod registry;

pub use receiver::CommandReceiver;
pub use registry::{CommandHandler, CommandHandlerRegistry};
