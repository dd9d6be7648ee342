//! The assignment table `T[replica][partition] -> node_index`.
//!
//! Pure data: no notion of nodes or capacity lives here, only the 2-D
//! index structure and the expansion operation used when the partition
//! space grows.

/// Sentinel meaning "no node assigned to this replica slot".
pub const UNASSIGNED: i32 = -1;

/// A 2-D table mapping `(replica, partition)` to a node index, or
/// [`UNASSIGNED`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentTable {
	replica_count: usize,
	partition_bits: u16,
	rows: Vec<Vec<i32>>,
}

impl AssignmentTable {
	/// Build a fresh table of `replica_count` rows of `partition_count`
	/// slots, all unassigned. `partition_count` must be a power of two.
	pub fn new(replica_count: usize, partition_count: usize) -> Self {
		assert!(
			partition_count.is_power_of_two() || partition_count == 0,
			"partition_count must be a power of two"
		);
		let partition_bits = if partition_count == 0 {
			0
		} else {
			partition_count.trailing_zeros() as u16
		};
		AssignmentTable {
			replica_count,
			partition_bits,
			rows: vec![vec![UNASSIGNED; partition_count]; replica_count],
		}
	}

	pub fn replica_count(&self) -> usize {
		self.replica_count
	}

	pub fn partition_bits(&self) -> u16 {
		self.partition_bits
	}

	pub fn partition_count(&self) -> usize {
		1usize << self.partition_bits
	}

	pub fn get(&self, replica: usize, partition: usize) -> i32 {
		self.rows[replica][partition]
	}

	pub fn set(&mut self, replica: usize, partition: usize, node_index: i32) {
		self.rows[replica][partition] = node_index;
	}

	pub fn row(&self, replica: usize) -> &[i32] {
		&self.rows[replica]
	}

	pub fn row_mut(&mut self, replica: usize) -> &mut [i32] {
		&mut self.rows[replica]
	}

	/// Grow the partition space to `new_partition_bits`, preserving
	/// existing placements: `T_new[r][p] = T_old[r][p >> shift]` where
	/// `shift = new_partition_bits - partition_bits`.
	///
	/// Shrinking is not supported: the data movement cost of a shrink
	/// dominates the savings, per the builder's resize policy.
	pub fn expand(&mut self, new_partition_bits: u16) {
		assert!(
			new_partition_bits >= self.partition_bits,
			"AssignmentTable::expand cannot shrink the partition space"
		);
		if new_partition_bits == self.partition_bits {
			return;
		}
		let shift = new_partition_bits - self.partition_bits;
		let new_partition_count = 1usize << new_partition_bits;
		for row in self.rows.iter_mut() {
			let old_row = std::mem::take(row);
			let mut new_row = Vec::with_capacity(new_partition_count);
			for p in 0..new_partition_count {
				new_row.push(old_row[p >> shift]);
			}
			*row = new_row;
		}
		self.partition_bits = new_partition_bits;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn new_table_all_unassigned() {
		let t = AssignmentTable::new(3, 4);
		assert_eq!(t.replica_count(), 3);
		assert_eq!(t.partition_count(), 4);
		for r in 0..3 {
			for p in 0..4 {
				assert_eq!(t.get(r, p), UNASSIGNED);
			}
		}
	}

	#[test]
	fn expand_preserves_placements() {
		let mut t = AssignmentTable::new(1, 2);
		t.set(0, 0, 10);
		t.set(0, 1, 20);
		t.expand(2); // 2 -> 4 partitions, shift = 1
		assert_eq!(t.partition_count(), 4);
		assert_eq!(t.row(0), &[10, 10, 20, 20]);
	}

	#[test]
	#[should_panic]
	fn expand_cannot_shrink() {
		let mut t = AssignmentTable::new(1, 4);
		t.expand(1);
	}
}
