//! The message capability: the payload abstraction callers hand to the
//! messenger. The transport never interprets the payload, only its type
//! tag and declared length.

use async_trait::async_trait;
use tokio::net::tcp::OwnedWriteHalf;

use crate::frame::FramedWriter;

/// A handle over the payload portion of an outbound frame, given to
/// [`Message::write_content`]. Writes go through the connection's framing
/// codec under its intra-message timeout.
pub struct FrameWriteHandle<'a> {
	pub(crate) writer: &'a mut FramedWriter<OwnedWriteHalf>,
	pub(crate) timeout: std::time::Duration,
}

impl<'a> FrameWriteHandle<'a> {
	/// Write `buf` to the wire. Returns the number of bytes written, or
	/// an I/O error (which includes the framing codec's own timeouts).
	pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.writer
			.write_payload(buf, self.timeout)
			.await
			.map_err(ring_util::error_to_io)?;
		Ok(buf.len())
	}
}

/// A caller-supplied message: the transport's only contract with
/// application payloads. `done()` fires exactly once, whether the send
/// attempt (or fan-out) succeeded or not — callers relying on it for
/// cleanup (releasing a buffer, notifying a future) can count on that.
#[async_trait]
pub trait Message: Send {
	fn msg_type(&self) -> u64;
	fn msg_length(&self) -> u64;

	/// Write the payload. Returns the number of bytes actually written
	/// and, on failure, the I/O error that caused the attempt to stop
	/// short.
	async fn write_content(&mut self, writer: &mut FrameWriteHandle<'_>) -> (u64, Option<std::io::Error>);

	/// Called exactly once by the messenger when a send attempt (or a
	/// whole fan-out, for [`crate::messenger::Messenger::send_to_other_replicas`])
	/// is complete, successful or not.
	fn done(&mut self);
}

/// Wraps a [`Message`] whose `done()` must not fire from this call site —
/// used by `send_to_other_replicas` fan-out, where each per-replica send
/// goes through the normal single-target send path but only the fan-out's
/// own completion should invoke the caller's `done()`.
pub(crate) struct NoDoneMessage<M>(pub M);

#[async_trait]
impl<M: Message> Message for NoDoneMessage<M> {
	fn msg_type(&self) -> u64 {
		self.0.msg_type()
	}

	fn msg_length(&self) -> u64 {
		self.0.msg_length()
	}

	async fn write_content(&mut self, writer: &mut FrameWriteHandle<'_>) -> (u64, Option<std::io::Error>) {
		self.0.write_content(writer).await
	}

	fn done(&mut self) {
		// Intentionally a no-op: the fan-out owner calls done() once.
	}
}

/// A simple in-memory [`Message`], useful for tests and for callers who
/// already have their payload fully materialized. `Clone`, so it can be
/// used directly with [`crate::messenger::Messenger::send_to_other_replicas`],
/// which fans out to several targets from one logical message.
#[derive(Clone)]
pub struct BytesMessage {
	msg_type: u64,
	payload: std::sync::Arc<Vec<u8>>,
	on_done: Option<std::sync::Arc<dyn Fn() + Send + Sync>>,
}

impl BytesMessage {
	pub fn new(msg_type: u64, payload: Vec<u8>) -> Self {
		BytesMessage {
			msg_type,
			payload: std::sync::Arc::new(payload),
			on_done: None,
		}
	}

	pub fn with_done_callback(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
		self.on_done = Some(std::sync::Arc::new(f));
		self
	}
}

#[async_trait]
impl Message for BytesMessage {
	fn msg_type(&self) -> u64 {
		self.msg_type
	}

	fn msg_length(&self) -> u64 {
		self.payload.len() as u64
	}

	async fn write_content(&mut self, writer: &mut FrameWriteHandle<'_>) -> (u64, Option<std::io::Error>) {
		match writer.write_all(&self.payload).await {
			Ok(n) => (n as u64, None),
			Err(e) => (0, Some(e)),
		}
	}

	fn done(&mut self) {
		if let Some(f) = self.on_done.take() {
			f();
		}
	}
}
