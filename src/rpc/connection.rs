//! A single peer connection: the write half plus the lock that serializes
//! frames onto it. The read half is never stored here — it is moved into
//! the dedicated reader task spawned for the connection's lifetime, so
//! reads never contend with the registry or with writers.

use std::net::SocketAddr;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::frame::FramedWriter;

/// The write side of one established connection. Held behind an `Arc` so
/// both the registry and any in-flight send future can reach it; the
/// inner `Mutex` is the serialization point that makes one frame's
/// `header + payload` atomic on the wire.
pub struct Connection {
	pub addr: SocketAddr,
	pub writer: Mutex<FramedWriter<OwnedWriteHalf>>,
}

impl Connection {
	pub fn new(addr: SocketAddr, writer: OwnedWriteHalf, chunk_size: usize) -> Self {
		Connection {
			addr,
			writer: Mutex::new(FramedWriter::new(writer, chunk_size)),
		}
	}
}

/// What the registry knows about an address at a point in time.
pub enum ConnState {
	/// A dial is in flight. The token lets [`crate::registry::Registry::finish_dial`]
	/// tell whether it is still the dial that owns this slot, or whether it
	/// lost a race (to an inbound accept, or to a second redundant dial)
	/// and should quietly drop its connection instead of installing it.
	Connecting(u64),
	Connected(std::sync::Arc<Connection>),
}
