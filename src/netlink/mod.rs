//! NFQUEUE control-socket wire protocol.
//!
//! [`message`] frames the generic netlink/nfnetlink envelope; [`nfqueue`] layers the NFQUEUE
//! subsystem's message types, attributes, and verdict protocol on top of it.

pub mod message;
pub mod nfqueue;

pub use nfqueue::{ControlSocket, OwnedQueuedPacket};
