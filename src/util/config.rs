//! Configuration recognized by the messenger (see the table in the crate's
//! external interface documentation). Parsing a config file or command-line
//! flags into this struct is left to the host application; this crate only
//! defines the struct and its defaults.

use std::time::Duration;

use serde::Deserialize;

fn default_chunk_size() -> usize {
	16 * 1024
}

fn default_connection_timeout() -> DurationSecs {
	DurationSecs(Duration::from_secs(60))
}

fn default_intra_message_timeout() -> DurationSecs {
	DurationSecs(Duration::from_secs(2))
}

fn default_inter_message_timeout() -> DurationSecs {
	DurationSecs(Duration::from_secs(2 * 60 * 60))
}

fn default_address_index() -> usize {
	0
}

fn default_points_allowed() -> u32 {
	1
}

/// A duration expressed in seconds in configuration files, parsed into a
/// [`std::time::Duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DurationSecs(#[serde(with = "duration_secs")] pub Duration);

impl From<DurationSecs> for Duration {
	fn from(d: DurationSecs) -> Duration {
		d.0
	}
}

mod duration_secs {
	use serde::{Deserialize, Deserializer};
	use std::time::Duration;

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = u64::deserialize(deserializer)?;
		Ok(Duration::from_secs(secs))
	}
}

/// Tunables for a [`Messenger`](../../ring_rpc/messenger/struct.Messenger.html).
///
/// Defaults: `chunk_size` 16 KiB, `connection_timeout` 60s,
/// `intra_message_timeout` 2s, `inter_message_timeout` 2h,
/// `address_index` 0.
#[derive(Debug, Clone, Deserialize)]
pub struct MessengerConfig {
	/// Size, in bytes, of the per-chunk I/O buffer used by the framing codec.
	#[serde(default = "default_chunk_size")]
	pub chunk_size: usize,

	/// Upper bound on a single dial attempt.
	#[serde(default = "default_connection_timeout")]
	pub connection_timeout: DurationSecs,

	/// Per-chunk read/write deadline from the second byte of a frame's
	/// header through the end of its payload.
	#[serde(default = "default_intra_message_timeout")]
	pub intra_message_timeout: DurationSecs,

	/// Idle deadline while waiting for the first byte of the next frame.
	#[serde(default = "default_inter_message_timeout")]
	pub inter_message_timeout: DurationSecs,

	/// Which of a node's published addresses to dial.
	#[serde(default = "default_address_index")]
	pub address_index: usize,
}

impl Default for MessengerConfig {
	fn default() -> Self {
		MessengerConfig {
			chunk_size: default_chunk_size(),
			connection_timeout: default_connection_timeout(),
			intra_message_timeout: default_intra_message_timeout(),
			inter_message_timeout: default_inter_message_timeout(),
			address_index: default_address_index(),
		}
	}
}

/// Balance tolerance for the ring builder, in whole percentage points.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BuilderConfig {
	#[serde(default = "default_points_allowed")]
	pub points_allowed: u32,
}

impl Default for BuilderConfig {
	fn default() -> Self {
		BuilderConfig {
			points_allowed: default_points_allowed(),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn messenger_config_defaults() {
		let cfg = MessengerConfig::default();
		assert_eq!(cfg.chunk_size, 16 * 1024);
		assert_eq!(Duration::from(cfg.connection_timeout), Duration::from_secs(60));
		assert_eq!(
			Duration::from(cfg.intra_message_timeout),
			Duration::from_secs(2)
		);
		assert_eq!(
			Duration::from(cfg.inter_message_timeout),
			Duration::from_secs(2 * 60 * 60)
		);
		assert_eq!(cfg.address_index, 0);
		assert_eq!(BuilderConfig::default().points_allowed, 1);
	}

	#[test]
	fn parses_from_toml() {
		let toml_str = r#"
			chunk_size = 4096
			connection_timeout = 10
			intra_message_timeout = 1
			inter_message_timeout = 3600
			address_index = 1
		"#;
		let cfg: MessengerConfig = toml::from_str(toml_str).unwrap();
		assert_eq!(cfg.chunk_size, 4096);
		assert_eq!(Duration::from(cfg.connection_timeout), Duration::from_secs(10));
	}
}
