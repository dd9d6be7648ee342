//! The Ring Messenger: a length-prefixed TCP transport demultiplexed by
//! message type, addressed through a versioned [`RingSnapshot`] rather
//! than a static peer list.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use ring_core::{Node, RingSnapshot};
use ring_util::config::MessengerConfig;
use ring_util::error::{Error, Result};
use ring_util::metrics::MessengerMetrics;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::connection::Connection;
use crate::frame::{FramedReader, FramedWriter};
use crate::handler::Handler;
use crate::message::{FrameWriteHandle, Message};
use crate::registry::{DialOutcome, Registry};

/// Delays between the three attempts [`Messenger::send_to_node`] makes
/// before giving up: 1s after the first failure, 2s after the second,
/// 4s after the third (which is also the last — no sleep follows it).
const RETRY_BACKOFF: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];

/// How often the accept loop re-checks the shutdown signal while waiting
/// for the next inbound connection.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ties a versioned [`RingSnapshot`] to the connection registry that
/// actually moves bytes. Cloning a `Messenger` is cheap (it is built
/// around `Arc` internally); callers are expected to hold it behind
/// their own `Arc` to share it across tasks, mirroring how the ring's
/// own node status is held in an [`ArcSwap`] rather than behind a lock.
pub struct Messenger<N: Node> {
	ring: ArcSwap<RingSnapshot<N>>,
	registry: Registry,
	config: MessengerConfig,
	metrics: MessengerMetrics,
	stop_tx: watch::Sender<bool>,
	stop_rx: watch::Receiver<bool>,
}

impl<N: Node + Send + Sync + 'static> Messenger<N> {
	pub fn new(initial: RingSnapshot<N>, config: MessengerConfig) -> Arc<Self> {
		let (stop_tx, stop_rx) = watch::channel(false);
		Arc::new(Messenger {
			ring: ArcSwap::new(Arc::new(initial)),
			registry: Registry::new(),
			config,
			metrics: MessengerMetrics::new(),
			stop_tx,
			stop_rx,
		})
	}

	pub fn metrics(&self) -> &MessengerMetrics {
		&self.metrics
	}

	/// The snapshot currently in effect. Cheap: an `Arc` clone.
	pub fn ring(&self) -> Arc<RingSnapshot<N>> {
		self.ring.load_full()
	}

	/// Install a newly built snapshot. Concurrent sends observe either
	/// the old or the new snapshot, never a partially-updated one.
	pub fn update_ring(&self, snapshot: RingSnapshot<N>) {
		self.ring.store(Arc::new(snapshot));
	}

	pub async fn register_handler(&self, msg_type: u64, handler: Arc<dyn Handler>) {
		self.registry.register_handler(msg_type, handler).await;
	}

	/// Stop listening and signal every spawned task (the accept loop and
	/// every per-connection reader) to exit.
	pub fn stop(&self) {
		let _ = self.stop_tx.send(true);
	}

	/// Send `msg` to `node_id`'s published address (per
	/// [`MessengerConfig::address_index`]), retrying up to three times
	/// with exponential backoff: a failed attempt is always followed by
	/// its delay (1s, then 2s, then 4s — even after the third and final
	/// attempt) before giving up, so a send against an unreachable node
	/// takes roughly 7s to resolve. `done()` fires exactly once,
	/// regardless of outcome.
	pub async fn send_to_node(self: &Arc<Self>, node_id: u64, mut msg: impl Message) -> Result<()> {
		let result = self.send_to_node_inner(node_id, &mut msg).await;
		msg.done();
		result
	}

	async fn send_to_node_inner(self: &Arc<Self>, node_id: u64, msg: &mut impl Message) -> Result<()> {
		let ring = self.ring.load_full();
		let node = ring
			.node(node_id)
			.ok_or_else(|| Error::message(format!("unknown node {}", node_id)))?;
		let addr = node
			.address(self.config.address_index)
			.ok_or_else(|| Error::message(format!("node {} has no address at index {}", node_id, self.config.address_index)))?;
		drop(ring);

		let mut last_err = None;
		for (attempt, backoff) in RETRY_BACKOFF.iter().enumerate() {
			match self.send_once(addr, msg).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					warn!(attempt, %addr, error = %e, "send attempt failed");
					last_err = Some(e);
					tokio::time::sleep(*backoff).await;
				}
			}
		}
		Err(last_err.unwrap_or_else(|| Error::message("send failed with no recorded error")))
	}

	/// One attempt: get (or establish) a connection to `addr` and write
	/// one frame over it. Never blocks on a dial: if none is ready yet,
	/// the attempt fails immediately and the caller's own backoff is
	/// what gives the (possibly just-kicked-off) dial time to land.
	async fn send_once(self: &Arc<Self>, addr: SocketAddr, msg: &mut impl Message) -> Result<()> {
		let conn = self
			.connection_or_start_dial(addr)
			.await
			.ok_or_else(|| Error::message(format!("not yet connected to {}", addr)))?;
		let result = self.write_frame(&conn, msg).await;
		if result.is_err() {
			self.registry.disconnect(addr, &conn).await;
			self.metrics.inc_connections_evicted();
		}
		result
	}

	async fn write_frame(&self, conn: &Arc<Connection>, msg: &mut impl Message) -> Result<()> {
		let msg_type = msg.msg_type();
		let declared_length = msg.msg_length();
		let intra_timeout = Duration::from(self.config.intra_message_timeout);

		let mut writer = conn.writer.lock().await;
		writer.write_header(msg_type, declared_length, intra_timeout).await?;
		let mut handle = FrameWriteHandle {
			writer: &mut *writer,
			timeout: intra_timeout,
		};
		let (written, write_err) = msg.write_content(&mut handle).await;
		if let Some(e) = write_err {
			return Err(Error::Io(e));
		}
		if written != declared_length {
			return Err(Error::LengthMismatch {
				declared: declared_length,
				actual: written,
			});
		}
		writer.flush(intra_timeout).await?;
		self.metrics.inc_frames_sent();
		Ok(())
	}

	/// Non-blocking lookup: returns a ready connection to `addr` if one
	/// exists. If none does, atomically stakes a `CONNECTING` placeholder
	/// and launches the dial on a detached task, but does not wait on it
	/// — this call still returns `None` right away. A lookup that lands
	/// while somebody else's dial is already in flight also returns
	/// `None` without starting a second one.
	async fn connection_or_start_dial(self: &Arc<Self>, addr: SocketAddr) -> Option<Arc<Connection>> {
		match self.registry.begin_dial(addr).await {
			DialOutcome::AlreadyConnected(c) => Some(c),
			DialOutcome::AlreadyDialing => None,
			DialOutcome::ShouldDial(token) => {
				self.metrics.inc_dials_started();
				let this = self.clone();
				tokio::spawn(async move {
					match this.dial(addr).await {
						Ok((conn, read_half)) => match this.registry.finish_dial(addr, token, conn).await {
							Some(_) => this.spawn_reader(addr, read_half),
							// lost the race; read_half is dropped, closing the socket.
							None => (),
						},
						Err(e) => {
							this.metrics.inc_dials_failed();
							warn!(%addr, error = %e, "background dial failed");
							this.registry.abort_dial(addr, token).await;
						}
					}
				});
				None
			}
		}
	}

	async fn dial(self: &Arc<Self>, addr: SocketAddr) -> Result<(Connection, tokio::net::tcp::OwnedReadHalf)> {
		let connection_timeout = Duration::from(self.config.connection_timeout);
		let stream = tokio::time::timeout(connection_timeout, TcpStream::connect(addr))
			.await
			.map_err(|_| Error::Timeout)??;
		stream.set_nodelay(true).ok();
		let (read_half, write_half) = stream.into_split();
		Ok((Connection::new(addr, write_half, self.config.chunk_size), read_half))
	}

	/// Send `msg` to every other node responsible for `partition`, per
	/// the ring snapshot that was current when the caller decided to
	/// send. If the ring has moved on to a newer version by the time
	/// this call runs, the fan-out is dropped entirely (the caller is
	/// expected to recompute the send against the new snapshot) and
	/// `done()` still fires exactly once.
	pub async fn send_to_other_replicas<M>(self: &Arc<Self>, ring_version: i64, partition: usize, exclude: u64, mut msg: M)
	where
		M: Message + Clone + 'static,
	{
		let current = self.ring.load_full();
		if current.version() != ring_version {
			let stale = Error::StaleRingVersion {
				expected: ring_version,
				actual: current.version(),
			};
			debug!(partition, error = %stale, "dropping fan-out against a superseded ring");
			msg.done();
			return;
		}

		let targets: Vec<u64> = current
			.responsible_ids(partition)
			.into_iter()
			.flatten()
			.filter(|id| *id != exclude)
			.collect();

		let mut tasks = Vec::with_capacity(targets.len());
		for node_id in targets {
			let this = self.clone();
			let copy = crate::message::NoDoneMessage(msg.clone());
			tasks.push(tokio::spawn(async move {
				if let Err(e) = this.send_to_node(node_id, copy).await {
					warn!(node_id, error = %e, "fan-out send failed");
				}
			}));
		}
		for t in tasks {
			let _ = t.await;
		}
		msg.done();
	}

	/// Accept connections until [`Self::stop`] is called. Each accepted
	/// connection immediately spawns its own reader task; this loop only
	/// ever does the `accept()` itself, polling the shutdown signal
	/// between attempts so it notices a stop request within
	/// [`ACCEPT_POLL_INTERVAL`].
	pub async fn listen(self: &Arc<Self>, bind_addr: SocketAddr) -> Result<()> {
		let listener = TcpListener::bind(bind_addr).await?;
		info!(%bind_addr, "messenger listening");
		let mut stop_rx = self.stop_rx.clone();
		loop {
			if *stop_rx.borrow() {
				return Ok(());
			}
			tokio::select! {
				_ = stop_rx.changed() => return Ok(()),
				accepted = tokio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()) => {
					match accepted {
						Ok(Ok((stream, peer_addr))) => self.accept(peer_addr, stream),
						Ok(Err(e)) => warn!(error = %e, "accept failed"),
						Err(_) => {} // poll interval elapsed, loop back to check stop_rx
					}
				}
			}
		}
	}

	fn accept(self: &Arc<Self>, addr: SocketAddr, stream: TcpStream) {
		stream.set_nodelay(true).ok();
		let (read_half, write_half) = stream.into_split();
		self.spawn_reader(addr, read_half);
		let conn = Connection::new(addr, write_half, self.config.chunk_size);
		let this = self.clone();
		tokio::spawn(async move {
			this.registry.insert_inbound(addr, conn).await;
		});
	}

	fn spawn_reader(self: &Arc<Self>, addr: SocketAddr, read_half: tokio::net::tcp::OwnedReadHalf) {
		let this = self.clone();
		tokio::spawn(async move { this.handle_forever(addr, read_half).await });
	}

	/// The per-connection reader loop: read a frame's header under the
	/// idle/intra-message timeout split, dispatch to the registered
	/// handler for its `msg_type`, and evict the connection the moment
	/// anything about the frame looks wrong (timeout, unknown type,
	/// handler error, or a handler that didn't consume the whole
	/// declared payload).
	async fn handle_forever(self: Arc<Self>, addr: SocketAddr, read_half: tokio::net::tcp::OwnedReadHalf) {
		let mut reader = FramedReader::new(read_half, self.config.chunk_size);
		let idle_timeout = Duration::from(self.config.inter_message_timeout);
		let intra_timeout = Duration::from(self.config.intra_message_timeout);
		let mut stop_rx = self.stop_rx.clone();
		let mut evicted = false;

		loop {
			if *stop_rx.borrow() {
				break;
			}
			let header = tokio::select! {
				_ = stop_rx.changed() => break,
				h = reader.read_header(idle_timeout, intra_timeout) => h,
			};
			let (msg_type, length) = match header {
				Ok(h) => h,
				Err(e) => {
					debug!(%addr, error = %e, "connection reader stopping");
					evicted = true;
					break;
				}
			};
			self.metrics.inc_frames_received();

			let handler = self.registry.handler_for(msg_type).await;
			let mut payload = reader.payload(length, intra_timeout);
			match handler {
				Some(h) => {
					if let Err(e) = h.handle(addr, &mut payload).await {
						warn!(%addr, msg_type, error = %e, "handler failed");
						evicted = true;
						break;
					}
					if payload.consumed() != length {
						let e = Error::LengthMismatch {
							declared: length,
							actual: payload.consumed(),
						};
						warn!(%addr, msg_type, error = %e, "evicting connection");
						evicted = true;
						break;
					}
				}
				None => {
					let e = Error::UnknownMessageType(msg_type);
					warn!(%addr, error = %e, "evicting connection");
					evicted = true;
					break;
				}
			}
		}

		if let Some(conn) = self.registry.connection(addr).await {
			self.registry.disconnect(addr, &conn).await;
		}
		if evicted {
			self.metrics.inc_connections_evicted();
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use async_trait::async_trait;
	use ring_core::{Builder, StaticNode};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tokio::sync::mpsc;

	const PING: u64 = 1;

	struct RecordingHandler {
		tx: mpsc::UnboundedSender<Vec<u8>>,
	}

	#[async_trait]
	impl Handler for RecordingHandler {
		async fn handle(
			&self,
			_from: SocketAddr,
			payload: &mut crate::frame::PayloadReader<'_, tokio::net::tcp::OwnedReadHalf>,
		) -> std::io::Result<()> {
			let bytes = payload.read_to_vec().await.map_err(ring_util::error_to_io)?;
			let _ = self.tx.send(bytes);
			Ok(())
		}
	}

	async fn free_addr() -> SocketAddr {
		let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
		l.local_addr().unwrap()
	}

	fn two_node_ring(addr_a: SocketAddr, addr_b: SocketAddr) -> (u64, u64, RingSnapshot<StaticNode>) {
		let mut builder: Builder<StaticNode> = Builder::new(1);
		let a = builder.add(StaticNode::new(1, 1, vec![], vec![addr_a]));
		let b = builder.add(StaticNode::new(2, 1, vec![], vec![addr_b]));
		let snapshot = builder.snapshot(0);
		let _ = (a, b);
		(1, 2, snapshot)
	}

	#[tokio::test]
	async fn round_trip_send_and_receive() {
		let addr_a = free_addr().await;
		let addr_b = free_addr().await;
		let (id_a, id_b, ring) = two_node_ring(addr_a, addr_b);

		let messenger_a = Messenger::new(ring.clone(), MessengerConfig::default());
		let messenger_b = Messenger::new(ring, MessengerConfig::default());

		let (tx, mut rx) = mpsc::unbounded_channel();
		messenger_b
			.register_handler(PING, Arc::new(RecordingHandler { tx }))
			.await;

		let b = messenger_b.clone();
		tokio::spawn(async move { b.listen(addr_b).await.unwrap() });
		// Give the listener a moment to bind before dialing.
		tokio::time::sleep(Duration::from_millis(20)).await;

		let done_called = Arc::new(AtomicUsize::new(0));
		let flag = done_called.clone();
		let msg = crate::message::BytesMessage::new(PING, b"hello ring".to_vec())
			.with_done_callback(move || {
				flag.fetch_add(1, Ordering::SeqCst);
			});

		messenger_a.send_to_node(id_b, msg).await.unwrap();
		let _ = id_a;

		let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
			.await
			.expect("handler should have run")
			.expect("channel should not be closed");
		assert_eq!(received, b"hello ring");
		assert_eq!(done_called.load(Ordering::SeqCst), 1);

		messenger_b.stop();
		messenger_a.stop();
	}

	#[tokio::test]
	async fn send_to_other_replicas_drops_on_stale_ring_version() {
		let addr_a = free_addr().await;
		let addr_b = free_addr().await;
		let (_id_a, id_b, ring) = two_node_ring(addr_a, addr_b);
		let current_version = ring.version();

		let messenger_a = Messenger::new(ring, MessengerConfig::default());

		let done_called = Arc::new(AtomicUsize::new(0));
		let flag = done_called.clone();
		let msg = crate::message::BytesMessage::new(PING, b"stale".to_vec())
			.with_done_callback(move || {
				flag.fetch_add(1, Ordering::SeqCst);
			});

		// A version older than what's installed: the fan-out must be
		// dropped entirely, but done() still fires exactly once.
		messenger_a
			.send_to_other_replicas(current_version - 1, 0, id_b, msg)
			.await;

		assert_eq!(done_called.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn send_to_node_retries_three_times_with_backoff_then_fails() {
		// A bound-then-dropped listener: the OS refuses connections to
		// this port immediately, so every attempt fails fast and only the
		// backoff sleeps after each attempt consume (virtual) time.
		let addr = free_addr().await;

		let mut builder: Builder<StaticNode> = Builder::new(1);
		let node_id = builder.add(StaticNode::new(1, 1, vec![], vec![addr])) as u64;
		let _ = node_id;
		let ring = builder.snapshot(0);
		let target_id = ring.node_ids()[0];

		let messenger = Messenger::new(ring, MessengerConfig::default());
		let started = tokio::time::Instant::now();
		let msg = crate::message::BytesMessage::new(PING, b"x".to_vec());
		let result = messenger.send_to_node(target_id, msg).await;
		assert!(result.is_err());
		// Three attempts, each followed by its backoff (1s + 2s + 4s,
		// including after the final attempt): at least 7s of virtual
		// time must have elapsed.
		assert!(tokio::time::Instant::now() - started >= Duration::from_secs(7));
	}
}
