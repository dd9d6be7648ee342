//! The inbound side of the message capability: a registered decoder for
//! one message type, invoked by the connection's reader task once a
//! frame's header has been read and validated.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::tcp::OwnedReadHalf;

use crate::frame::PayloadReader;

/// A callback registered for one `msg_type`. Handlers are looked up once
/// per inbound frame and must consume exactly the frame's declared
/// length from `payload` — the reader task treats a short read as a
/// protocol violation and evicts the connection.
#[async_trait]
pub trait Handler: Send + Sync {
	async fn handle(
		&self,
		from: SocketAddr,
		payload: &mut PayloadReader<'_, OwnedReadHalf>,
	) -> std::io::Result<()>;
}
