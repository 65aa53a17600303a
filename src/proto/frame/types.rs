use bytes::Bytes;

/// A decoded RESP reply.
///
/// This enum covers the five frame types of the protocol:
/// - `Simple`: status replies like `+OK`
/// - `Error`: error replies (`-ERR ...`), with the text preserved so
///   callers can inspect redirect prefixes
/// - `Integer`: numeric replies (`:1000`)
/// - `Bulk`: binary-safe string data (`$6\r\nfoobar`)
/// - `Array`: nested replies (`*2\r\n...`)
/// - `Null`: the null bulk string or null array (`$-1` / `*-1`)
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Simple string (`+OK`).
    Simple(String),
    /// Error reply (`-ERR`). Text accessible for routing inspection.
    Error(String),
    /// Integer (`:1000`).
    Integer(i64),
    /// Bulk string (`$6\r\nfoobar`).
    Bulk(Bytes),
    /// Null (`$-1` or `*-1`).
    Null,
    /// Array (`*2\r\n...`).
    Array(Vec<Reply>),
}

impl Reply {
    /// The `OK` sentinel: the exact simple string `+OK`.
    pub fn ok() -> Reply {
        Reply::Simple("OK".to_string())
    }

    /// Returns true if this reply is the `OK` sentinel.
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Simple(s) if s == "OK")
    }

    /// Returns true if this reply is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Null)
    }

    /// Attempts to extract the bulk payload of this reply.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Reply::Bulk(b) => Some(b),
            _ => None,
        }
    }

    /// Attempts to extract the simple-string text of this reply.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Simple(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract the integer value of this reply.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Reply::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract the elements of an array reply.
    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the error text, if this is an error reply.
    pub fn error_text(&self) -> Option<&str> {
        match self {
            Reply::Error(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_sentinel() {
        assert!(Reply::ok().is_ok());
        assert!(Reply::Simple("OK".to_string()).is_ok());
        assert!(!Reply::Simple("PONG".to_string()).is_ok());
        assert!(!Reply::Bulk(Bytes::from("OK")).is_ok());
    }

    #[test]
    fn test_reply_as_bytes() {
        let data = Bytes::from("hello");
        let reply = Reply::Bulk(data.clone());
        assert_eq!(reply.as_bytes(), Some(&data));
        assert_eq!(Reply::Integer(42).as_bytes(), None);
    }

    #[test]
    fn test_reply_as_int() {
        assert_eq!(Reply::Integer(42).as_int(), Some(42));
        assert_eq!(Reply::Null.as_int(), None);
    }

    #[test]
    fn test_reply_as_array() {
        let items = vec![Reply::Integer(1), Reply::Integer(2)];
        let reply = Reply::Array(items.clone());
        assert_eq!(reply.as_array(), Some(items.as_slice()));
        assert_eq!(Reply::Integer(42).as_array(), None);
    }

    #[test]
    fn test_reply_is_null() {
        assert!(Reply::Null.is_null());
        assert!(!Reply::Integer(42).is_null());
    }

    #[test]
    fn test_reply_error_text() {
        let reply = Reply::Error("MOVED 3999 127.0.0.1:7001".to_string());
        assert_eq!(reply.error_text(), Some("MOVED 3999 127.0.0.1:7001"));
        assert_eq!(Reply::Null.error_text(), None);
    }
}
