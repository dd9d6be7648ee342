//! The wire framing codec: `(msg_type: u64, length: u64, payload)`, all
//! big-endian, read and written in bounded chunks under one of two
//! timeout regimes.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use ring_util::error::{Error, Result};

const HEADER_LEN: usize = 16;

/// Reads frames off a byte stream, switching timeout regime exactly at
/// the header's second byte: the idle timeout covers only the very
/// first byte of the next frame, and the intra-message timeout covers
/// everything from there through the end of the payload.
pub struct FramedReader<R> {
	stream: R,
	chunk_size: usize,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
	pub fn new(stream: R, chunk_size: usize) -> Self {
		FramedReader { stream, chunk_size }
	}

	/// Read one frame's header under the idle/intra-message timeout
	/// split. Returns `(msg_type, length)`.
	pub async fn read_header(
		&mut self,
		idle_timeout: Duration,
		intra_timeout: Duration,
	) -> Result<(u64, u64)> {
		let mut header = [0u8; HEADER_LEN];

		timeout(idle_timeout, self.stream.read_exact(&mut header[..1]))
			.await
			.map_err(|_| Error::Timeout)??;

		timeout(intra_timeout, self.stream.read_exact(&mut header[1..]))
			.await
			.map_err(|_| Error::Timeout)??;

		let msg_type = u64::from_be_bytes(header[0..8].try_into().unwrap());
		let length = u64::from_be_bytes(header[8..16].try_into().unwrap());
		Ok((msg_type, length))
	}

	/// A handle over this reader's remaining payload bytes for the frame
	/// currently being read, enforcing the intra-message timeout per
	/// chunk and tracking how many bytes the handler actually consumed.
	pub fn payload(&mut self, declared_length: u64, intra_timeout: Duration) -> PayloadReader<'_, R> {
		PayloadReader {
			stream: &mut self.stream,
			chunk_size: self.chunk_size,
			timeout: intra_timeout,
			declared_length,
			consumed: 0,
		}
	}
}

/// Streaming view over one frame's payload, given to a registered
/// handler. The handler is expected to consume exactly `declared_length`
/// bytes; [`Self::consumed`] is compared against that by the caller.
pub struct PayloadReader<'a, R> {
	stream: &'a mut R,
	chunk_size: usize,
	timeout: Duration,
	declared_length: u64,
	consumed: u64,
}

impl<'a, R: AsyncRead + Unpin> PayloadReader<'a, R> {
	pub fn declared_length(&self) -> u64 {
		self.declared_length
	}

	pub fn consumed(&self) -> u64 {
		self.consumed
	}

	/// Read exactly `buf.len()` bytes, in chunks bounded by the codec's
	/// `chunk_size`, each chunk bounded by the intra-message timeout.
	pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
		let mut off = 0;
		while off < buf.len() {
			let end = std::cmp::min(off + self.chunk_size, buf.len());
			timeout(self.timeout, self.stream.read_exact(&mut buf[off..end]))
				.await
				.map_err(|_| Error::Timeout)??;
			off = end;
		}
		self.consumed += buf.len() as u64;
		Ok(())
	}

	/// Read the remaining declared bytes into a freshly allocated buffer.
	/// Convenience for handlers that just want the whole payload.
	pub async fn read_to_vec(&mut self) -> Result<Vec<u8>> {
		let remaining = (self.declared_length - self.consumed) as usize;
		let mut buf = vec![0u8; remaining];
		self.read_exact(&mut buf).await?;
		Ok(buf)
	}

	/// Discard the remaining declared bytes without returning them, for
	/// handlers that only care about the prefix of a payload.
	pub async fn discard_remaining(&mut self) -> Result<()> {
		let mut remaining = (self.declared_length - self.consumed) as usize;
		let mut scratch = vec![0u8; std::cmp::min(self.chunk_size, remaining.max(1))];
		while remaining > 0 {
			let n = std::cmp::min(remaining, scratch.len());
			self.read_exact(&mut scratch[..n]).await?;
			remaining -= n;
		}
		Ok(())
	}
}

/// Writes frames to a byte stream. Not thread-safe: callers must hold the
/// connection's write lock for the duration of one frame's
/// `header + payload + flush` sequence.
pub struct FramedWriter<W> {
	stream: W,
	chunk_size: usize,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
	pub fn new(stream: W, chunk_size: usize) -> Self {
		FramedWriter { stream, chunk_size }
	}

	pub async fn write_header(&mut self, msg_type: u64, length: u64, t: Duration) -> Result<()> {
		let mut header = [0u8; HEADER_LEN];
		header[0..8].copy_from_slice(&msg_type.to_be_bytes());
		header[8..16].copy_from_slice(&length.to_be_bytes());
		self.write_chunked(&header, t).await
	}

	pub async fn write_payload(&mut self, data: &[u8], t: Duration) -> Result<()> {
		self.write_chunked(data, t).await
	}

	async fn write_chunked(&mut self, data: &[u8], t: Duration) -> Result<()> {
		let mut off = 0;
		while off < data.len() {
			let end = std::cmp::min(off + self.chunk_size, data.len());
			timeout(t, self.stream.write_all(&data[off..end]))
				.await
				.map_err(|_| Error::Timeout)??;
			off = end;
		}
		Ok(())
	}

	pub async fn flush(&mut self, t: Duration) -> Result<()> {
		timeout(t, self.stream.flush()).await.map_err(|_| Error::Timeout)??;
		Ok(())
	}

	pub fn get_mut(&mut self) -> &mut W {
		&mut self.stream
	}
}
