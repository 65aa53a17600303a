use bytes::{BufMut, BytesMut};

use crate::proto::error::Result;
use crate::proto::frame::Reply;
use crate::proto::value::Value;

const SCRATCH_SIZE: usize = 64;

/// A RESP command encoder.
///
/// Commands are written as arrays of bulk strings into an internal buffer
/// drained by [`take`](CommandEncoder::take). Each [`encode`] call appends
/// one complete command, so the caller can flush after every command and
/// pipeline freely without further coordination. The encoder keeps no
/// framing state: a partial write to the underlying transport invalidates
/// the stream.
///
/// [`encode`]: CommandEncoder::encode
///
/// # Example
///
/// ```
/// use shoal::proto::codec::CommandEncoder;
///
/// let mut encoder = CommandEncoder::new();
/// encoder.encode("PING", &[]).unwrap();
/// assert_eq!(encoder.take().as_ref(), b"*1\r\n$4\r\nPING\r\n");
/// ```
pub struct CommandEncoder {
    buf: BytesMut,
    // Length prefixes are formatted right-to-left into this scratch; the
    // last two bytes stay `\r\n` for the lifetime of the encoder.
    scratch: [u8; SCRATCH_SIZE],
}

impl CommandEncoder {
    /// Creates a new encoder with an empty buffer.
    pub fn new() -> Self {
        let mut scratch = [0u8; SCRATCH_SIZE];
        scratch[SCRATCH_SIZE - 2] = b'\r';
        scratch[SCRATCH_SIZE - 1] = b'\n';
        Self {
            buf: BytesMut::new(),
            scratch,
        }
    }

    fn put_len(&mut self, prefix: u8, mut k: usize) {
        let mut i = SCRATCH_SIZE - 3;
        loop {
            if k < 10 {
                self.scratch[i] = b'0' + k as u8;
                i -= 1;
                break;
            }
            self.scratch[i] = b'0' + (k % 10) as u8;
            i -= 1;
            k /= 10;
        }
        self.scratch[i] = prefix;
        self.buf.extend_from_slice(&self.scratch[i..]);
    }

    fn put_bytes(&mut self, data: &[u8]) {
        self.put_len(b'$', data.len());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Encodes one command as `*<n+1>` followed by the name and each
    /// argument as a bulk string.
    ///
    /// # Errors
    ///
    /// Fails only when a [`Value::Custom`] marshaller fails.
    pub fn encode(&mut self, name: &str, args: &[Value]) -> Result<()> {
        self.put_len(b'*', args.len() + 1);
        self.put_bytes(name.as_bytes());

        for arg in args {
            match arg {
                Value::Bytes(b) => self.put_bytes(b),
                Value::Str(s) => self.put_bytes(s.as_bytes()),
                Value::Int(k) => self.put_bytes(k.to_string().as_bytes()),
                Value::Uint(k) => self.put_bytes(k.to_string().as_bytes()),
                Value::Float(x) => self.put_bytes(x.to_string().as_bytes()),
                Value::Bool(true) => self.put_bytes(b"1"),
                Value::Bool(false) => self.put_bytes(b"0"),
                Value::Null => self.put_bytes(b""),
                Value::Custom(m) => {
                    let data = m.marshal()?;
                    self.put_bytes(&data);
                }
            }
        }

        Ok(())
    }

    /// Encodes a reply value. Used by tests and mock servers; a client
    /// only ever writes commands.
    pub fn encode_reply(&mut self, reply: &Reply) {
        match reply {
            Reply::Simple(s) => {
                self.buf.put_u8(b'+');
                self.buf.extend_from_slice(s.as_bytes());
                self.buf.extend_from_slice(b"\r\n");
            }
            Reply::Error(text) => {
                self.buf.put_u8(b'-');
                self.buf.extend_from_slice(text.as_bytes());
                self.buf.extend_from_slice(b"\r\n");
            }
            Reply::Integer(k) => {
                self.buf.put_u8(b':');
                self.buf.extend_from_slice(k.to_string().as_bytes());
                self.buf.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(data) => {
                self.put_len(b'$', data.len());
                self.buf.extend_from_slice(data);
                self.buf.extend_from_slice(b"\r\n");
            }
            Reply::Null => {
                self.buf.extend_from_slice(b"$-1\r\n");
            }
            Reply::Array(items) => {
                self.put_len(b'*', items.len());
                for item in items {
                    self.encode_reply(item);
                }
            }
        }
    }

    /// Takes the encoded data from the buffer, leaving it empty.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::proto::value::Marshal;

    fn encoded(name: &str, args: &[Value]) -> BytesMut {
        let mut encoder = CommandEncoder::new();
        encoder.encode(name, args).unwrap();
        encoder.take()
    }

    #[test]
    fn test_encode_no_args() {
        assert_eq!(encoded("PING", &[]).as_ref(), b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn test_encode_string_args() {
        assert_eq!(
            encoded("SET", &["foo".into(), "bar".into()]).as_ref(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"
        );
    }

    #[test]
    fn test_encode_bytes_arg() {
        assert_eq!(
            encoded("SET", &["k".into(), Bytes::from_static(b"\x00\x01").into()]).as_ref(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$2\r\n\x00\x01\r\n"
        );
    }

    #[test]
    fn test_encode_int_args() {
        assert_eq!(
            encoded("LRANGE", &["list".into(), 0i64.into(), (-1i64).into()]).as_ref(),
            b"*4\r\n$6\r\nLRANGE\r\n$4\r\nlist\r\n$1\r\n0\r\n$2\r\n-1\r\n"
        );
    }

    #[test]
    fn test_encode_float_arg() {
        assert_eq!(
            encoded("MSET", &["a".into(), 42i64.into(), "b".into(), 3.1415f64.into()]).as_ref(),
            b"*5\r\n$4\r\nMSET\r\n$1\r\na\r\n$2\r\n42\r\n$1\r\nb\r\n$6\r\n3.1415\r\n"
        );
    }

    #[test]
    fn test_encode_bool_args() {
        assert_eq!(
            encoded("SET", &["k".into(), true.into()]).as_ref(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\n1\r\n"
        );
        assert_eq!(
            encoded("SET", &["k".into(), false.into()]).as_ref(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\n0\r\n"
        );
    }

    #[test]
    fn test_encode_null_arg() {
        assert_eq!(
            encoded("SET", &["k".into(), Value::Null]).as_ref(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$0\r\n\r\n"
        );
    }

    #[test]
    fn test_encode_json_fallback() {
        #[derive(serde::Serialize)]
        struct Obj {
            #[serde(rename = "N")]
            n: i32,
            #[serde(rename = "B")]
            b: bool,
        }

        assert_eq!(
            encoded("SET", &["obj".into(), Value::json(Obj { n: 1, b: true })]).as_ref(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nobj\r\n$16\r\n{\"N\":1,\"B\":true}\r\n"
        );
    }

    #[test]
    fn test_encode_custom_marshal_failure() {
        struct Broken;

        impl Marshal for Broken {
            fn marshal(&self) -> Result<Vec<u8>> {
                Err(crate::proto::error::Error::InvalidArgument {
                    message: "broken".to_string(),
                })
            }
        }

        let mut encoder = CommandEncoder::new();
        assert!(encoder
            .encode("SET", &["k".into(), Value::Custom(Arc::new(Broken))])
            .is_err());
    }

    #[test]
    fn test_encode_multi_digit_lengths() {
        let long = "x".repeat(123);
        let data = encoded("SET", &["k".into(), long.clone().into()]);
        let expected = format!("*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$123\r\n{}\r\n", long);
        assert_eq!(data.as_ref(), expected.as_bytes());
    }

    #[test]
    fn test_encode_reply_simple() {
        let mut encoder = CommandEncoder::new();
        encoder.encode_reply(&Reply::Simple("PONG".to_string()));
        assert_eq!(encoder.take().as_ref(), b"+PONG\r\n");
    }

    #[test]
    fn test_encode_reply_error() {
        let mut encoder = CommandEncoder::new();
        encoder.encode_reply(&Reply::Error("ERR bad".to_string()));
        assert_eq!(encoder.take().as_ref(), b"-ERR bad\r\n");
    }

    #[test]
    fn test_encode_reply_nested_array() {
        let mut encoder = CommandEncoder::new();
        encoder.encode_reply(&Reply::Array(vec![
            Reply::Integer(1),
            Reply::Array(vec![Reply::Bulk(Bytes::from("42")), Reply::Null]),
        ]));
        assert_eq!(
            encoder.take().as_ref(),
            b"*2\r\n:1\r\n*2\r\n$2\r\n42\r\n$-1\r\n"
        );
    }
}
