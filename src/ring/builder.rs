//! The mutable, authoritative builder: sizes the partition space to the
//! cluster's capacity skew, invokes the rebalancer, and hands out
//! immutable snapshots.

use ring_util::time::now_nanos;

use crate::node::{Node, NO_LOCAL_NODE, PARTITION_COUNT_MAX};
use crate::rebalance::{GreedyRebalancer, Rebalance};
use crate::snapshot::RingSnapshot;
use crate::stats::Stats;
use crate::table::AssignmentTable;

/// Mutable authoritative ring state. Single-owner: the caller must
/// synchronize mutation externally and must not race a mutation with
/// [`Builder::snapshot`].
pub struct Builder<N: Node> {
	version: i64,
	nodes: Vec<N>,
	table: AssignmentTable,
	points_allowed: u32,
	replica_count: usize,
	rebalancer: Box<dyn Rebalance<N> + Send + Sync>,
}

impl<N: Node> Builder<N> {
	/// A fresh builder for `replica_count` replicas, using the crate's
	/// default [`GreedyRebalancer`].
	pub fn new(replica_count: usize) -> Self {
		Self::with_rebalancer(replica_count, Box::new(GreedyRebalancer::new()))
	}

	/// Same as [`Self::new`] but with a caller-supplied rebalancer, for
	/// swapping in a real tier-diversity scoring policy.
	pub fn with_rebalancer(
		replica_count: usize,
		rebalancer: Box<dyn Rebalance<N> + Send + Sync>,
	) -> Self {
		Builder {
			version: 0,
			nodes: Vec::new(),
			table: AssignmentTable::new(replica_count, 1),
			points_allowed: 1,
			replica_count,
			rebalancer,
		}
	}

	/// Balance tolerance, in whole percentage points. Default 1.
	pub fn set_points_allowed(&mut self, points_allowed: u32) {
		self.points_allowed = points_allowed;
	}

	pub fn points_allowed(&self) -> u32 {
		self.points_allowed
	}

	pub fn replica_count(&self) -> usize {
		self.replica_count
	}

	/// Append a node. Node indices are stable for the builder's lifetime:
	/// nodes are never removed, only deactivated via their own `active`
	/// flag.
	pub fn add(&mut self, node: N) -> usize {
		self.nodes.push(node);
		debug!(
			node_index = self.nodes.len() - 1,
			"node added to ring builder"
		);
		self.nodes.len() - 1
	}

	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	pub fn nodes(&self) -> &[N] {
		&self.nodes
	}

	/// Grow the partition space until every active node's desired share
	/// rounds within `points_allowed%`, or the ceiling is reached.
	/// Returns `true` iff the partition space grew.
	pub fn resize_if_needed(&mut self) -> bool {
		let total_capacity: u64 = self
			.nodes
			.iter()
			.filter(|n| n.active())
			.map(|n| n.capacity() as u64)
			.sum();
		if total_capacity == 0 {
			return false;
		}

		let tol = self.points_allowed as f64 / 100.0;
		let mut grew = false;

		loop {
			let partition_count = self.table.partition_count();
			if partition_count >= PARTITION_COUNT_MAX {
				break;
			}

			let mut out_of_tolerance = false;
			for n in self.nodes.iter().filter(|n| n.active()) {
				let desired = partition_count as f64 * self.replica_count as f64 * n.capacity() as f64
					/ total_capacity as f64;
				if desired <= 0.0 {
					continue;
				}
				let f = desired - desired.floor();
				if f == 0.0 {
					// desired share is already an exact integer: no
					// rounding error, hence no imbalance to correct.
					continue;
				}
				let under = f / desired;
				let over = (1.0 - f) / desired;
				if under > tol || over > tol {
					out_of_tolerance = true;
					break;
				}
			}

			if !out_of_tolerance {
				break;
			}

			let new_bits = self.table.partition_bits() + 1;
			info!(
				old_bits = self.table.partition_bits(),
				new_bits, "growing partition space to satisfy balance tolerance"
			);
			self.table.expand(new_bits);
			grew = true;
		}

		grew
	}

	/// Resize and rebalance as needed, then return a deep-copied,
	/// immutable snapshot. `local_node_id` may be [`NO_LOCAL_NODE`] (`0`)
	/// if the caller has no local identity to resolve.
	pub fn snapshot(&mut self, local_node_id: u64) -> RingSnapshot<N> {
		let resized = self.resize_if_needed();
		let rebalanced = self.rebalancer.rebalance(&self.nodes, &mut self.table);
		if resized || rebalanced {
			self.version = now_nanos();
		}

		// Per the source's (preserved, if questionable) behavior: default
		// to index 0 when the local id isn't found, rather than -1.
		// Consumers must independently check `local_node_id != NO_LOCAL_NODE`
		// before trusting `local_node()`.
		let local_node_index = self
			.nodes
			.iter()
			.position(|n| n.node_id() == local_node_id)
			.map(|i| i as i64)
			.unwrap_or(0);

		RingSnapshot::new(
			self.version,
			self.nodes.clone(),
			local_node_index,
			self.table.clone(),
		)
	}

	/// Compute a balance report. This calls [`Self::snapshot`] internally
	/// and so may itself trigger a resize/rebalance.
	pub fn stats(&mut self) -> Stats {
		let snapshot = self.snapshot(NO_LOCAL_NODE);
		Stats::compute(self, &snapshot)
	}
}
