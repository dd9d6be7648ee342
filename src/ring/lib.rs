//! Capacity-weighted, tier-aware consistent partition assignment.
//!
//! This crate owns the placement half of the substrate: [`Node`],
//! [`AssignmentTable`], [`RingSnapshot`], and the mutable [`Builder`] that
//! sizes the partition space to the cluster's capacity skew and produces
//! versioned, immutable snapshots. The [`rebalance`] module is the seam
//! where a real tier-diversity scoring policy is meant to be plugged in;
//! this crate only ships a simple one so it is runnable standalone.

#[macro_use]
extern crate tracing;

pub mod builder;
pub mod node;
pub mod rebalance;
pub mod snapshot;
pub mod stats;
pub mod table;

pub use builder::Builder;
pub use node::{Node, StaticNode, NO_LOCAL_NODE, PARTITION_COUNT_MAX};
pub use rebalance::{GreedyRebalancer, Rebalance};
pub use snapshot::RingSnapshot;
pub use stats::Stats;
pub use table::{AssignmentTable, UNASSIGNED};
