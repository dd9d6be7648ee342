//! The Ring Messenger: a length-prefixed, demultiplexed TCP transport
//! addressed through a versioned [`ring_core::RingSnapshot`] rather than
//! a static peer list. Dials are single-flighted per address; an
//! inbound accept always wins a race against our own outbound dial to
//! the same peer.

#[macro_use]
extern crate tracing;

pub mod connection;
pub mod frame;
pub mod handler;
pub mod message;
pub mod messenger;
pub mod registry;

pub use connection::Connection;
pub use frame::{FramedReader, FramedWriter, PayloadReader};
pub use handler::Handler;
pub use message::{BytesMessage, FrameWriteHandle, Message};
pub use messenger::Messenger;
pub use registry::Registry;
