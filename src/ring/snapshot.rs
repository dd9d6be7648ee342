//! The ring snapshot: an immutable, shareable view produced by the
//! builder. Once built, a snapshot never changes; producing a new one
//! requires going back through the builder.

use crate::node::Node;
use crate::table::{AssignmentTable, UNASSIGNED};

/// An immutable placement view over a versioned assignment table plus the
/// node identities it indexes into.
///
/// Safe to share across concurrent readers without synchronization: all
/// of its fields are read-only after construction.
#[derive(Debug, Clone)]
pub struct RingSnapshot<N: Node> {
	version: i64,
	nodes: Vec<N>,
	local_node_index: i64,
	table: AssignmentTable,
}

impl<N: Node> RingSnapshot<N> {
	pub(crate) fn new(version: i64, nodes: Vec<N>, local_node_index: i64, table: AssignmentTable) -> Self {
		RingSnapshot {
			version,
			nodes,
			local_node_index,
			table,
		}
	}

	pub fn version(&self) -> i64 {
		self.version
	}

	pub fn partition_bits(&self) -> u16 {
		self.table.partition_bits()
	}

	pub fn partition_count(&self) -> usize {
		self.table.partition_count()
	}

	pub fn replica_count(&self) -> usize {
		self.table.replica_count()
	}

	/// All node identities known to this snapshot, in table-index order.
	pub fn node_ids(&self) -> Vec<u64> {
		self.nodes.iter().map(|n| n.node_id()).collect()
	}

	/// Look up a node by id. Linear scan: snapshots are expected to hold
	/// at most a few hundred nodes.
	pub fn node(&self, node_id: u64) -> Option<&N> {
		self.nodes.iter().find(|n| n.node_id() == node_id)
	}

	pub fn local_node(&self) -> Option<&N> {
		if self.local_node_index < 0 {
			return None;
		}
		self.nodes.get(self.local_node_index as usize)
	}

	/// One node per replica for `partition`. A replica with no assignment
	/// yields `None` in that slot; callers must skip it.
	pub fn responsible_nodes(&self, partition: usize) -> Vec<Option<&N>> {
		(0..self.table.replica_count())
			.map(|r| {
				let idx = self.table.get(r, partition);
				if idx == UNASSIGNED {
					None
				} else {
					self.nodes.get(idx as usize)
				}
			})
			.collect()
	}

	/// Same as [`Self::responsible_nodes`], in node-id form.
	pub fn responsible_ids(&self, partition: usize) -> Vec<Option<u64>> {
		self.responsible_nodes(partition)
			.into_iter()
			.map(|n| n.map(|n| n.node_id()))
			.collect()
	}

	/// The partition a 64-bit hash falls into: its top `partition_bits`
	/// bits. Always `0` when `partition_bits() == 0`.
	pub fn partition_for(&self, hash: u64) -> u32 {
		let bits = self.partition_bits();
		if bits == 0 {
			0
		} else {
			(hash >> (64 - bits as u32)) as u32
		}
	}

	pub(crate) fn table(&self) -> &AssignmentTable {
		&self.table
	}
}
