//! Connection handling.
//!
//! The pieces a single logical connection is made of:
//!
//! - [`request`] - Ordered command batches with per-command outcomes
//! - [`dialer`] - The transport seam (TCP by default, anything in tests)
//! - [`connection`] - The pipelined connection with reconnect and the
//!   script cache
//! - [`direct`] - The unpipelined testing/benchmark hook

#![warn(missing_docs)]

/// Pipelined connection management.
pub mod connection;
/// Transport dialing.
pub mod dialer;
/// Single-shot connection hook.
pub mod direct;
/// Requests and commands.
pub mod request;

pub use crate::proto::error::{Error, Result};
pub use connection::{Connection, ConnectionConfig};
pub use dialer::{BoxStream, Dialer, TcpDialer};
pub use direct::DirectConn;
pub use request::{Command, Request};
