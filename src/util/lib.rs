//! Utility crate for the ring placement and messaging substrate: error
//! types, time helpers, configuration, and lightweight metrics shared by
//! [`ring_core`](../ring_core/index.html) and [`ring_rpc`](../ring_rpc/index.html).

#[macro_use]
extern crate tracing;

pub mod config;
pub mod error;
pub mod metrics;
pub mod time;

pub use error::{error_to_io, Error, Result};
