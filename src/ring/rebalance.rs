//! The tier-layout rebalancing heuristic is an external collaborator:
//! its internal scoring policy is out of scope here, and this crate
//! only needs it to produce a valid assignment table. This module
//! defines the seam ([`Rebalance`]) and ships one concrete, deliberately
//! simple implementation ([`GreedyRebalancer`]) so the crate's own
//! tests run standalone.

use crate::node::Node;
use crate::table::{AssignmentTable, UNASSIGNED};

/// Produces a valid assignment table from a node list. Implementations
/// must uphold the invariants in the data model: no node index repeated
/// within a partition's replica set, and only active node indices used.
///
/// Returns `true` if it changed the table.
pub trait Rebalance<N: Node> {
	fn rebalance(&self, nodes: &[N], table: &mut AssignmentTable) -> bool;
}

/// A capacity-weighted round robin over active nodes, with a best-effort
/// avoidance of placing two replicas of the same partition on nodes that
/// share their innermost tier value (e.g. the same host).
///
/// This is intentionally simple: it is a stand-in for whatever
/// tier-diversity scoring policy a real deployment plugs in, not a claim
/// about optimal placement quality.
#[derive(Debug, Default)]
pub struct GreedyRebalancer;

impl GreedyRebalancer {
	pub fn new() -> Self {
		GreedyRebalancer
	}
}

/// Smooth weighted round robin: each call to `next` advances every node's
/// running credit by its capacity, then picks (and debits) the node with
/// the highest credit. Produces a cyclic sequence whose long-run frequency
/// of each node is proportional to its capacity, without bursts of the
/// same node in a row.
struct WeightedCycle {
	indices: Vec<usize>,
	weights: Vec<i64>,
	credits: Vec<i64>,
}

impl WeightedCycle {
	fn new<N: Node>(nodes: &[N]) -> Self {
		let mut indices = Vec::new();
		let mut weights = Vec::new();
		for (i, n) in nodes.iter().enumerate() {
			if n.active() && n.capacity() > 0 {
				indices.push(i);
				weights.push(n.capacity() as i64);
			}
		}
		let credits = vec![0; indices.len()];
		WeightedCycle {
			indices,
			weights,
			credits,
		}
	}

	fn is_empty(&self) -> bool {
		self.indices.is_empty()
	}

	/// Pick the next node index, skipping any whose node index is in
	/// `exclude`. Returns `None` if every node is excluded.
	fn next(&mut self, exclude: &[usize]) -> Option<usize> {
		if self.indices.is_empty() {
			return None;
		}
		let total: i64 = self.weights.iter().sum();
		// Try up to one full lap; each attempt debits whichever node it
		// picked, which keeps the long-run distribution fair even when
		// some picks are rejected by the caller.
		for _ in 0..self.indices.len() {
			for (c, w) in self.credits.iter_mut().zip(self.weights.iter()) {
				*c += *w;
			}
			let (best, _) = self
				.credits
				.iter()
				.enumerate()
				.max_by_key(|(_, c)| **c)
				.unwrap();
			self.credits[best] -= total;
			let node_index = self.indices[best];
			if !exclude.contains(&node_index) {
				return Some(node_index);
			}
		}
		None
	}
}

impl<N: Node> Rebalance<N> for GreedyRebalancer {
	fn rebalance(&self, nodes: &[N], table: &mut AssignmentTable) -> bool {
		let mut changed = false;
		let mut cycle = WeightedCycle::new(nodes);
		if cycle.is_empty() {
			for r in 0..table.replica_count() {
				for p in 0..table.partition_count() {
					if table.get(r, p) != UNASSIGNED {
						table.set(r, p, UNASSIGNED);
						changed = true;
					}
				}
			}
			return changed;
		}

		for p in 0..table.partition_count() {
			let mut used_nodes: Vec<usize> = Vec::with_capacity(table.replica_count());
			let mut used_tiers: Vec<u32> = Vec::with_capacity(table.replica_count());

			for r in 0..table.replica_count() {
				let picked = pick_with_tier_preference(&mut cycle, nodes, &used_nodes, &used_tiers);
				let new_value = match picked {
					Some(idx) => idx as i32,
					None => UNASSIGNED,
				};
				if table.get(r, p) != new_value {
					table.set(r, p, new_value);
					changed = true;
				}
				if let Some(idx) = picked {
					used_nodes.push(idx);
					if let Some(&t0) = nodes[idx].tier_values().first() {
						used_tiers.push(t0);
					}
				}
			}
		}

		changed
	}
}

/// Try to find a node not already used for this partition and, if
/// possible, not sharing an already-used innermost tier value. Falls back
/// to any unused node if tier-diverse placement isn't available.
fn pick_with_tier_preference<N: Node>(
	cycle: &mut WeightedCycle,
	nodes: &[N],
	used_nodes: &[usize],
	used_tiers: &[u32],
) -> Option<usize> {
	// First pass: demand tier diversity too, by excluding nodes whose
	// innermost tier is already used, in addition to nodes already used.
	let mut exclude = used_nodes.to_vec();
	for (i, n) in nodes.iter().enumerate() {
		if let Some(&t0) = n.tier_values().first() {
			if used_tiers.contains(&t0) && !exclude.contains(&i) {
				exclude.push(i);
			}
		}
	}
	let mut probe = WeightedCycle {
		indices: cycle.indices.clone(),
		weights: cycle.weights.clone(),
		credits: cycle.credits.clone(),
	};
	if let Some(idx) = probe.next(&exclude) {
		*cycle = probe;
		return Some(idx);
	}
	// Fall back: distinctness only.
	cycle.next(used_nodes)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::node::StaticNode;
	use std::collections::HashSet;

	fn node(id: u64, capacity: u32, tier: u32) -> StaticNode {
		StaticNode::new(id, capacity, vec![tier], vec![])
	}

	#[test]
	fn no_duplicate_node_per_partition() {
		let nodes = vec![node(1, 100, 1), node(2, 100, 2), node(3, 100, 3)];
		let mut table = AssignmentTable::new(3, 8);
		GreedyRebalancer::new().rebalance(&nodes, &mut table);
		for p in 0..table.partition_count() {
			let mut seen = HashSet::new();
			for r in 0..table.replica_count() {
				let v = table.get(r, p);
				if v != UNASSIGNED {
					assert!(seen.insert(v), "duplicate node in partition {}", p);
				}
			}
		}
	}

	#[test]
	fn zero_active_nodes_clears_table() {
		let nodes: Vec<StaticNode> = vec![];
		let mut table = AssignmentTable::new(1, 1);
		table.set(0, 0, 5);
		let changed = GreedyRebalancer::new().rebalance(&nodes, &mut table);
		assert!(changed);
		assert_eq!(table.get(0, 0), UNASSIGNED);
	}

	#[test]
	fn insufficient_nodes_leaves_some_replicas_unassigned() {
		let nodes = vec![node(1, 100, 1)];
		let mut table = AssignmentTable::new(2, 2);
		GreedyRebalancer::new().rebalance(&nodes, &mut table);
		for p in 0..table.partition_count() {
			let assigned = (0..table.replica_count())
				.filter(|&r| table.get(r, p) != UNASSIGNED)
				.count();
			assert_eq!(assigned, 1);
		}
	}
}
