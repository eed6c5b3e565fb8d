//! The hub's real-time protocol: wire messages and the per-connection
//! state machine that sequences them.

pub mod machine;
pub mod message;

pub use machine::{Effect, Input, Phase, ProtocolMachine};
pub use message::{InboundMessage, OutboundMessage};
