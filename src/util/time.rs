//! Wall-clock helpers. The builder stamps ring versions with the
//! nanosecond count at the moment a rebalance actually changed something,
//! so that two successive snapshots can never share a version unless their
//! assignment tables are identical.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
pub fn now_msec() -> u64 {
	now_nanos() / 1_000_000
}

/// Current time in nanoseconds since the Unix epoch, as a signed 64-bit
/// integer so it can be used directly as a ring version.
///
/// Saturates rather than panicking if the clock is somehow before the
/// epoch; this can only happen on a badly misconfigured host.
pub fn now_nanos() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_nanos() as i64)
		.unwrap_or_else(|e| {
			warn!(error = %e, "system clock before unix epoch, ring version will stall at 0");
			0
		})
}
