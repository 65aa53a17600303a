use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::proto::error::{Error, Result};

/// Implemented by types that marshal their own wire representation.
///
/// The encoder writes the marshalled bytes as one bulk string. Types that
/// do not implement this can still be passed as arguments through
/// [`Value::json`], which serializes them with `serde_json`.
pub trait Marshal: Send + Sync {
    /// Produces the bulk-string body for this value.
    fn marshal(&self) -> Result<Vec<u8>>;
}

/// A command argument.
///
/// Each variant maps to one bulk string on the wire:
/// raw bytes and strings verbatim, integers and floats as decimal ASCII,
/// booleans as `"1"`/`"0"`, null as the empty string, and custom values
/// through their [`Marshal`] implementation.
#[derive(Clone)]
pub enum Value {
    /// Raw bytes, emitted verbatim.
    Bytes(Bytes),
    /// A string, emitted verbatim.
    Str(String),
    /// A signed integer, emitted as decimal ASCII.
    Int(i64),
    /// An unsigned integer, emitted as decimal ASCII.
    Uint(u64),
    /// A float, emitted in its shortest round-trip decimal form.
    Float(f64),
    /// A boolean, emitted as `"1"` or `"0"`.
    Bool(bool),
    /// Null, emitted as the empty bulk string.
    Null,
    /// A value with a caller-supplied marshaller.
    Custom(Arc<dyn Marshal>),
}

impl Value {
    /// Wraps any serializable value so it is encoded as JSON.
    pub fn json<T>(value: T) -> Value
    where
        T: Serialize + Send + Sync + 'static,
    {
        Value::Custom(Arc::new(Json(value)))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Uint(u) => f.debug_tuple("Uint").field(u).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Null => write!(f, "Null"),
            Value::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Adapter that marshals any `Serialize` type as JSON.
pub struct Json<T>(pub T);

impl<T> Marshal for Json<T>
where
    T: Serialize + Send + Sync,
{
    fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| Error::InvalidArgument {
            message: e.to_string(),
        })
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Value {
        Value::Bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Value {
        Value::Bytes(b.into())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Value {
        Value::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<i8> for Value {
    fn from(k: i8) -> Value {
        Value::Int(k as i64)
    }
}

impl From<i16> for Value {
    fn from(k: i16) -> Value {
        Value::Int(k as i64)
    }
}

impl From<i32> for Value {
    fn from(k: i32) -> Value {
        Value::Int(k as i64)
    }
}

impl From<i64> for Value {
    fn from(k: i64) -> Value {
        Value::Int(k)
    }
}

impl From<u16> for Value {
    fn from(k: u16) -> Value {
        Value::Uint(k as u64)
    }
}

impl From<u32> for Value {
    fn from(k: u32) -> Value {
        Value::Uint(k as u64)
    }
}

impl From<u64> for Value {
    fn from(k: u64) -> Value {
        Value::Uint(k)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Value {
        Value::Float(x as f64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}
