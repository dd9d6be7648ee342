//! Node descriptor: the capability set the ring and builder need from a
//! cluster member. Any type meeting [`Node`] can be placed on the ring;
//! this crate does not prescribe how node identity or capacity is decided.

use std::net::SocketAddr;

/// Hard ceiling on the partition space. Never parameterize this: at the
/// ceiling, three replicas already cost ~100 MiB of index data.
pub const PARTITION_COUNT_MAX: usize = 1 << 23;

/// `node_id == 0` is reserved to mean "not a real node"; callers with no
/// local identity pass this to [`crate::Builder::snapshot`].
pub const NO_LOCAL_NODE: u64 = 0;

/// A cluster member as seen by the ring.
///
/// `tier_values` is ordered innermost-first (e.g. host, rack, zone,
/// region): two nodes sharing a value at some index share that failure
/// domain. `address` accepts a selector so a node may publish more than
/// one endpoint (e.g. an internal and an external address).
pub trait Node: Clone {
	fn node_id(&self) -> u64;
	fn active(&self) -> bool;
	fn capacity(&self) -> u32;
	fn tier_values(&self) -> &[u32];
	fn address(&self, address_index: usize) -> Option<SocketAddr>;
}

/// A plain, directly-constructible [`Node`] implementation, sufficient for
/// most callers and used throughout this crate's own tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNode {
	pub node_id: u64,
	pub active: bool,
	pub capacity: u32,
	pub tier_values: Vec<u32>,
	pub addresses: Vec<SocketAddr>,
}

impl StaticNode {
	pub fn new(node_id: u64, capacity: u32, tier_values: Vec<u32>, addresses: Vec<SocketAddr>) -> Self {
		StaticNode {
			node_id,
			active: true,
			capacity,
			tier_values,
			addresses,
		}
	}
}

impl Node for StaticNode {
	fn node_id(&self) -> u64 {
		self.node_id
	}

	fn active(&self) -> bool {
		self.active
	}

	fn capacity(&self) -> u32 {
		self.capacity
	}

	fn tier_values(&self) -> &[u32] {
		&self.tier_values
	}

	fn address(&self, address_index: usize) -> Option<SocketAddr> {
		self.addresses.get(address_index).copied()
	}
}
