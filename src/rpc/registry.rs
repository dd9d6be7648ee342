//! The connection registry and the handler table, sharing one lock: a
//! dial, an accept, and a handler lookup must all observe a single
//! consistent view of "what do we know about this peer right now".
//!
//! Single-flight dialing and accept-collision resolution both live here.
//! A dial claims an address with a `Connecting(token)` placeholder before
//! doing any I/O; whichever caller's token is still in the slot when the
//! dial finishes is the one allowed to install its connection. An
//! inbound accept never waits for a token match — it always wins,
//! because the peer that is calling us is, by definition, willing and
//! able to talk to us right now, which is a stronger signal than our own
//! in-flight dial's eventual success.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::{ConnState, Connection};
use crate::handler::Handler;

/// What a caller about to dial `addr` should do.
pub enum DialOutcome {
	/// Already connected; here is the existing connection.
	AlreadyConnected(Arc<Connection>),
	/// Somebody else is already dialing this address. The caller should
	/// not dial again.
	AlreadyDialing,
	/// No record of this address. The caller owns `token` and should
	/// dial, then call [`Registry::finish_dial`] or [`Registry::abort_dial`].
	ShouldDial(u64),
}

struct Inner {
	connections: HashMap<SocketAddr, ConnState>,
	handlers: HashMap<u64, Arc<dyn Handler>>,
}

pub struct Registry {
	inner: RwLock<Inner>,
	next_token: AtomicU64,
}

impl Registry {
	pub fn new() -> Self {
		Registry {
			inner: RwLock::new(Inner {
				connections: HashMap::new(),
				handlers: HashMap::new(),
			}),
			next_token: AtomicU64::new(1),
		}
	}

	pub async fn register_handler(&self, msg_type: u64, handler: Arc<dyn Handler>) {
		let mut inner = self.inner.write().await;
		inner.handlers.insert(msg_type, handler);
	}

	pub async fn handler_for(&self, msg_type: u64) -> Option<Arc<dyn Handler>> {
		let inner = self.inner.read().await;
		inner.handlers.get(&msg_type).cloned()
	}

	pub async fn connection(&self, addr: SocketAddr) -> Option<Arc<Connection>> {
		let inner = self.inner.read().await;
		match inner.connections.get(&addr) {
			Some(ConnState::Connected(c)) => Some(c.clone()),
			_ => None,
		}
	}

	/// Claim `addr` for an outbound dial, or report that one is already
	/// in flight or already connected.
	pub async fn begin_dial(&self, addr: SocketAddr) -> DialOutcome {
		let mut inner = self.inner.write().await;
		match inner.connections.get(&addr) {
			Some(ConnState::Connected(c)) => DialOutcome::AlreadyConnected(c.clone()),
			Some(ConnState::Connecting(_)) => DialOutcome::AlreadyDialing,
			None => {
				let token = self.next_token.fetch_add(1, Ordering::Relaxed);
				inner.connections.insert(addr, ConnState::Connecting(token));
				DialOutcome::ShouldDial(token)
			}
		}
	}

	/// A dial begun with `token` has produced `conn`. Installs it only if
	/// the slot is still `Connecting(token)` — i.e. nothing raced past us
	/// (an accept, or a second dial that somehow also reached here).
	/// Returns the installed connection, or `None` if the caller lost the
	/// race and should drop `conn` without using it.
	pub async fn finish_dial(&self, addr: SocketAddr, token: u64, conn: Connection) -> Option<Arc<Connection>> {
		let mut inner = self.inner.write().await;
		match inner.connections.get(&addr) {
			Some(ConnState::Connecting(t)) if *t == token => {
				let conn = Arc::new(conn);
				inner.connections.insert(addr, ConnState::Connected(conn.clone()));
				Some(conn)
			}
			_ => None,
		}
	}

	/// A dial begun with `token` failed. Clears the slot only if it is
	/// still ours, so we never erase a connection that won the race while
	/// we were dialing.
	pub async fn abort_dial(&self, addr: SocketAddr, token: u64) {
		let mut inner = self.inner.write().await;
		if let Some(ConnState::Connecting(t)) = inner.connections.get(&addr) {
			if *t == token {
				inner.connections.remove(&addr);
			}
		}
	}

	/// An inbound accept for `addr`. Always wins, replacing whatever was
	/// there — a still-dialing outbound attempt included.
	pub async fn insert_inbound(&self, addr: SocketAddr, conn: Connection) -> Arc<Connection> {
		let mut inner = self.inner.write().await;
		let conn = Arc::new(conn);
		inner.connections.insert(addr, ConnState::Connected(conn.clone()));
		conn
	}

	/// Remove `addr`'s record if it is still the connection the caller
	/// observed failing. A connection that has already been replaced (by
	/// a fresher accept or redial) is left alone.
	pub async fn disconnect(&self, addr: SocketAddr, observed: &Arc<Connection>) {
		let mut inner = self.inner.write().await;
		if let Some(ConnState::Connected(c)) = inner.connections.get(&addr) {
			if Arc::ptr_eq(c, observed) {
				inner.connections.remove(&addr);
			}
		}
	}
}

impl Default for Registry {
	fn default() -> Self {
		Registry::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tokio::net::{TcpListener, TcpStream};

	async fn loopback_pair() -> (SocketAddr, Connection, Connection) {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let (client, (server, _)) = tokio::join!(TcpStream::connect(addr), async {
			listener.accept().await.unwrap()
		});
		let client = client.unwrap();
		let (_cr, cw) = client.into_split();
		let (_sr, sw) = server.into_split();
		(addr, Connection::new(addr, cw, 4096), Connection::new(addr, sw, 4096))
	}

	#[tokio::test]
	async fn single_flight_dial_coalesces() {
		let registry = Registry::new();
		let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
		let token = match registry.begin_dial(addr).await {
			DialOutcome::ShouldDial(t) => t,
			_ => panic!("expected ShouldDial on first call"),
		};
		assert!(matches!(registry.begin_dial(addr).await, DialOutcome::AlreadyDialing));

		let (_addr, conn, _unused) = loopback_pair().await;
		let installed = registry.finish_dial(addr, token, conn).await;
		assert!(installed.is_some());
		assert!(registry.connection(addr).await.is_some());
	}

	#[tokio::test]
	async fn inbound_accept_wins_over_in_flight_dial() {
		let registry = Registry::new();
		let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
		let token = match registry.begin_dial(addr).await {
			DialOutcome::ShouldDial(t) => t,
			_ => panic!("expected ShouldDial"),
		};

		let (_addr, outbound_conn, inbound_conn) = loopback_pair().await;
		let inbound = registry.insert_inbound(addr, inbound_conn).await;

		// The outbound dial's result arrives after the peer already
		// connected to us; it must lose the race.
		let lost = registry.finish_dial(addr, token, outbound_conn).await;
		assert!(lost.is_none());

		let current = registry.connection(addr).await.unwrap();
		assert!(Arc::ptr_eq(&current, &inbound));
	}

	#[tokio::test]
	async fn disconnect_only_removes_the_observed_connection() {
		let registry = Registry::new();
		let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
		let token = match registry.begin_dial(addr).await {
			DialOutcome::ShouldDial(t) => t,
			_ => panic!("expected ShouldDial"),
		};
		let (_addr, conn, replacement) = loopback_pair().await;
		let stale = registry.finish_dial(addr, token, conn).await.unwrap();

		// Something else replaces the connection in the meantime.
		registry.insert_inbound(addr, replacement).await;

		// A caller still holding the stale Arc must not be able to evict
		// the fresher connection that replaced it.
		registry.disconnect(addr, &stale).await;
		assert!(registry.connection(addr).await.is_some());
	}
}
