//! Minimal metrics hook points. These are plain atomic counters a host
//! application can read directly; wiring them to an exporter is out of
//! scope for this crate.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracked by the connection registry and messenger.
#[derive(Debug, Default)]
pub struct MessengerMetrics {
	pub dials_started: AtomicU64,
	pub dials_failed: AtomicU64,
	pub connections_evicted: AtomicU64,
	pub frames_sent: AtomicU64,
	pub frames_received: AtomicU64,
}

impl MessengerMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn inc_dials_started(&self) {
		self.dials_started.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_dials_failed(&self) {
		self.dials_failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_connections_evicted(&self) {
		self.connections_evicted.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_frames_sent(&self) {
		self.frames_sent.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_frames_received(&self) {
		self.frames_received.fetch_add(1, Ordering::Relaxed);
	}
}
