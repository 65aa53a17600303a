//! RESP (REdis Serialization Protocol) support.
//!
//! Provides encoding of commands and decoding of replies for the tagged
//! wire format: simple strings (`+`), errors (`-`), integers (`:`), bulk
//! strings (`$`), and arrays (`*`), all terminated by `\r\n`.
//!
//! ## Modules
//!
//! - [`codec`] - Streaming encoder and decoder
//! - [`error`] - Error types
//! - [`frame`] - Decoded reply values
//! - [`value`] - Command argument values

#![warn(missing_docs)]

pub mod codec;
/// Error types.
pub mod error;
pub mod frame;
/// Argument values and marshalling.
pub mod value;

pub use error::{Error, Result};
pub use frame::Reply;
pub use value::{Json, Marshal, Value};
