//! Balance report. `Stats` is a non-functional / observability artifact:
//! tier-diversity quality of a real rebalancer is meant to be judged by
//! eyeballing (or scripting against) this report, not by the invariants
//! enforced on every snapshot.

use format_table::format_table_to_string;

use crate::builder::Builder;
use crate::node::Node;
use crate::snapshot::RingSnapshot;
use crate::table::UNASSIGNED;

/// How far one node's assigned partition count deviates from its desired
/// share, as a signed percentage (negative: under-assigned).
#[derive(Debug, Clone, Copy)]
pub struct NodeDeviation {
	pub node_index: usize,
	pub node_id: u64,
	pub assigned: usize,
	pub desired: f64,
	pub deviation_percent: f64,
}

/// A snapshot of the builder's balance, for humans and for tests.
#[derive(Debug, Clone)]
pub struct Stats {
	pub replica_count: usize,
	pub node_count: usize,
	pub inactive_node_count: usize,
	pub partition_bits: u16,
	pub partition_count: usize,
	pub points_allowed: u32,
	pub total_capacity: u64,
	pub worst_under: Option<NodeDeviation>,
	pub worst_over: Option<NodeDeviation>,
}

impl Stats {
	pub(crate) fn compute<N: Node>(builder: &Builder<N>, snapshot: &RingSnapshot<N>) -> Stats {
		let nodes = builder.nodes();
		let inactive_node_count = nodes.iter().filter(|n| !n.active()).count();
		let total_capacity: u64 = nodes
			.iter()
			.filter(|n| n.active())
			.map(|n| n.capacity() as u64)
			.sum();

		let mut assigned = vec![0usize; nodes.len()];
		let table = snapshot.table();
		for r in 0..table.replica_count() {
			for p in 0..table.partition_count() {
				let idx = table.get(r, p);
				if idx != UNASSIGNED {
					assigned[idx as usize] += 1;
				}
			}
		}

		let mut worst_under: Option<NodeDeviation> = None;
		let mut worst_over: Option<NodeDeviation> = None;

		if total_capacity > 0 {
			for (i, n) in nodes.iter().enumerate() {
				if !n.active() {
					continue;
				}
				let desired = table.partition_count() as f64 * table.replica_count() as f64
					* n.capacity() as f64
					/ total_capacity as f64;
				if desired <= 0.0 {
					continue;
				}
				let deviation_percent = (assigned[i] as f64 - desired) / desired * 100.0;
				let dev = NodeDeviation {
					node_index: i,
					node_id: n.node_id(),
					assigned: assigned[i],
					desired,
					deviation_percent,
				};
				if deviation_percent < 0.0
					&& worst_under
						.map(|w| deviation_percent < w.deviation_percent)
						.unwrap_or(true)
				{
					worst_under = Some(dev);
				}
				if deviation_percent > 0.0
					&& worst_over
						.map(|w| deviation_percent > w.deviation_percent)
						.unwrap_or(true)
				{
					worst_over = Some(dev);
				}
			}
		}

		Stats {
			replica_count: table.replica_count(),
			node_count: nodes.len(),
			inactive_node_count,
			partition_bits: table.partition_bits(),
			partition_count: table.partition_count(),
			points_allowed: builder.points_allowed(),
			total_capacity,
			worst_under,
			worst_over,
		}
	}

	/// Render as a table with one row per node: id, capacity, assigned
	/// partitions, deviation from desired share.
	pub fn to_table_lines<N: Node>(&self, builder: &Builder<N>, snapshot: &RingSnapshot<N>) -> Vec<String> {
		let table = snapshot.table();
		let mut assigned = vec![0usize; builder.node_count()];
		for r in 0..table.replica_count() {
			for p in 0..table.partition_count() {
				let idx = table.get(r, p);
				if idx != UNASSIGNED {
					assigned[idx as usize] += 1;
				}
			}
		}

		let mut rows = vec!["ID\tCapacity\tActive\tAssigned\tDeviation%".to_string()];
		for (i, n) in builder.nodes().iter().enumerate() {
			rows.push(format!(
				"{}\t{}\t{}\t{}\t{:.2}",
				n.node_id(),
				n.capacity(),
				n.active(),
				assigned[i],
				if n.active() && self.total_capacity > 0 {
					let desired = table.partition_count() as f64 * table.replica_count() as f64
						* n.capacity() as f64 / self.total_capacity as f64;
					if desired > 0.0 {
						(assigned[i] as f64 - desired) / desired * 100.0
					} else {
						0.0
					}
				} else {
					0.0
				}
			));
		}
		format_table_to_string(rows)
	}
}

impl std::fmt::Display for Stats {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		writeln!(
			f,
			"replicas={} nodes={} (inactive={}) partition_bits={} partition_count={} points_allowed={}% total_capacity={}",
			self.replica_count,
			self.node_count,
			self.inactive_node_count,
			self.partition_bits,
			self.partition_count,
			self.points_allowed,
			self.total_capacity
		)?;
		if let Some(u) = &self.worst_under {
			writeln!(
				f,
				"worst under-assigned: node #{} (id {}) {:.2}%",
				u.node_index, u.node_id, u.deviation_percent
			)?;
		}
		if let Some(o) = &self.worst_over {
			writeln!(
				f,
				"worst over-assigned: node #{} (id {}) {:.2}%",
				o.node_index, o.node_id, o.deviation_percent
			)?;
		}
		Ok(())
	}
}
