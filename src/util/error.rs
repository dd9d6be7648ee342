//! Crate-wide error vocabulary, shared across the ring builder and the
//! messenger rather than minting a new enum per crate.

use err_derive::Error;

/// The error type used throughout this workspace.
#[derive(Debug, Error)]
pub enum Error {
	#[error(display = "IO error: {}", _0)]
	Io(#[error(source)] std::io::Error),

	#[error(display = "Could not parse socket address: {}", _0)]
	AddrParse(#[error(source)] std::net::AddrParseError),

	#[error(display = "Timeout")]
	Timeout,

	#[error(display = "unknown message type {}", _0)]
	UnknownMessageType(u64),

	#[error(display = "message declared length {} but wrote/consumed {}", declared, actual)]
	LengthMismatch { declared: u64, actual: u64 },

	#[error(display = "stale ring version: expected {}, have {}", expected, actual)]
	StaleRingVersion { expected: i64, actual: i64 },

	#[error(display = "{}", _0)]
	Message(String),
}

impl Error {
	pub fn message<M: std::fmt::Display>(msg: M) -> Self {
		Error::Message(msg.to_string())
	}
}

impl From<String> for Error {
	fn from(s: String) -> Error {
		Error::Message(s)
	}
}

impl From<&str> for Error {
	fn from(s: &str) -> Error {
		Error::Message(s.to_string())
	}
}

impl From<tokio::time::error::Elapsed> for Error {
	fn from(_: tokio::time::error::Elapsed) -> Error {
		Error::Timeout
	}
}

pub type Result<T> = std::result::Result<T, Error>;

/// Collapse our error vocabulary to `std::io::Error`, for call sites (like
/// [`Message::write_content`](crate) implementations) that are bound to
/// `std::io::Result` by an external trait contract. An `Io` variant keeps
/// its original error kind; everything else becomes `ErrorKind::Other`.
pub fn error_to_io(e: Error) -> std::io::Error {
	match e {
		Error::Io(io) => io,
		Error::Timeout => std::io::Error::new(std::io::ErrorKind::TimedOut, Error::Timeout),
		other => std::io::Error::new(std::io::ErrorKind::Other, other),
	}
}
