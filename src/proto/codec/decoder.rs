use bytes::{Buf, Bytes, BytesMut};

use crate::proto::error::{Error, Result};
use crate::proto::frame::Reply;

/// A streaming RESP reply decoder.
///
/// Call [`append`](ReplyDecoder::append) as data arrives from the network,
/// then [`decode`](ReplyDecoder::decode) to parse replies. `Ok(None)`
/// means more data is needed; the buffer is only consumed once a complete
/// reply (including every element of a nested array) is available, so a
/// short read never loses input.
///
/// # Example
///
/// ```
/// use shoal::proto::codec::ReplyDecoder;
///
/// let mut decoder = ReplyDecoder::new();
/// decoder.append(b"+OK\r\n");
/// let reply = decoder.decode().unwrap().unwrap();
/// assert!(reply.is_ok());
/// ```
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    buf: BytesMut,
}

impl ReplyDecoder {
    /// Creates a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Appends raw bytes to the internal buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to decode one reply from the buffer.
    ///
    /// Returns `Ok(Some(reply))` for a complete reply, `Ok(None)` when
    /// more data is needed, and `Err(..)` when the stream is malformed.
    /// Error replies (`-...`) decode to [`Reply::Error`], not `Err`, so
    /// the caller can inspect the text.
    pub fn decode(&mut self) -> Result<Option<Reply>> {
        let mut pos = 0;
        match self.parse(&mut pos)? {
            Some(reply) => {
                self.buf.advance(pos);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }

    fn parse(&self, pos: &mut usize) -> Result<Option<Reply>> {
        let line = match self.take_line(pos)? {
            Some(line) => line,
            None => return Ok(None),
        };

        if line.is_empty() {
            return Err(Error::Protocol {
                message: "empty reply line".to_string(),
            });
        }

        match line[0] {
            b'+' => {
                let text = String::from_utf8(line[1..].to_vec()).map_err(|_| Error::Protocol {
                    message: "simple string is not valid utf-8".to_string(),
                })?;
                Ok(Some(Reply::Simple(text)))
            }
            b'-' => {
                let text = String::from_utf8_lossy(&line[1..]).into_owned();
                Ok(Some(Reply::Error(text)))
            }
            b':' => {
                let k = parse_int(&line[1..])?;
                Ok(Some(Reply::Integer(k)))
            }
            b'$' => {
                let n = parse_int(&line[1..])?;
                if n < 0 {
                    return Ok(Some(Reply::Null));
                }
                let n = n as usize;
                if self.buf.len() < *pos + n + 2 {
                    return Ok(None);
                }
                if &self.buf[*pos + n..*pos + n + 2] != b"\r\n" {
                    return Err(Error::Protocol {
                        message: "bulk string missing terminator".to_string(),
                    });
                }
                let data = Bytes::copy_from_slice(&self.buf[*pos..*pos + n]);
                *pos += n + 2;
                Ok(Some(Reply::Bulk(data)))
            }
            b'*' => {
                let n = parse_int(&line[1..])?;
                if n < 0 {
                    return Ok(Some(Reply::Null));
                }
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    match self.parse(pos)? {
                        Some(item) => items.push(item),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Reply::Array(items)))
            }
            other => Err(Error::Protocol {
                message: format!("unknown reply type '{}'", other as char),
            }),
        }
    }

    /// Returns the next line without its `\r\n` terminator, advancing
    /// `pos` past it. A `\n` not preceded by `\r` is fatal.
    fn take_line(&self, pos: &mut usize) -> Result<Option<&[u8]>> {
        let start = *pos;
        for i in start..self.buf.len() {
            if self.buf[i] != b'\n' {
                continue;
            }
            if i == start || self.buf[i - 1] != b'\r' {
                return Err(Error::Protocol {
                    message: "invalid line terminator".to_string(),
                });
            }
            *pos = i + 1;
            return Ok(Some(&self.buf[start..i - 1]));
        }
        Ok(None)
    }
}

fn parse_int(digits: &[u8]) -> Result<i64> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::Protocol {
            message: format!("invalid integer '{}'", String::from_utf8_lossy(digits)),
        })
}
