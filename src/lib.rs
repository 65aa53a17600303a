//! # Shoal
//!
//! Pipelined RESP client with transparent cluster routing.
//!
//! A [`Connection`] multiplexes many concurrent requests over one TCP
//! socket with bounded back-pressure, reconnects with backoff, and
//! replays cached Lua scripts after a reconnect. A [`Client`] wraps many
//! connections: it starts against a single node and migrates into
//! cluster-aware routing the first time a server answers `MOVED` or
//! `ASK`, from then on routing each request by the hash slot of its key.
//!
//! The core is command-agnostic: it transports arbitrary command/reply
//! pairs built from [`Request`] and [`Value`], decoded into [`Reply`].
//!
//! ## Example
//!
//! ```no_run
//! use shoal::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> shoal::Result<()> {
//!     let client = Client::new(vec!["localhost:6379".into()], ClientConfig::default());
//!     client.exec("SET", vec!["foo".into(), "bar".into()]).await?;
//!     let reply = client.exec("GET", vec!["foo".into()]).await?;
//!     assert_eq!(reply.as_bytes().map(|b| b.as_ref()), Some(&b"bar"[..]));
//!     client.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod core;
pub mod proto;

pub use crate::cluster::{key_slot, Client, ClientConfig};
pub use crate::core::{
    BoxStream, Connection, ConnectionConfig, Dialer, DirectConn, Request, TcpDialer,
};
pub use crate::proto::{Error, Json, Marshal, Reply, Result, Value};
