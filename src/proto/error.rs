use std::io;

use thiserror::Error;

/// Result type alias for shoal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred on the transport.
    #[error("io error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// The byte stream violated the wire protocol. Fatal to the stream.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the malformed input.
        message: String,
    },

    /// The server answered with an error reply. The connection stays healthy.
    #[error("server error: {message}")]
    Server {
        /// Error text from the server, without the leading `-`.
        message: String,
    },

    /// A cached script reloaded under a different id after a reconnect.
    /// Fatal to the connection.
    #[error("script {expected} reloaded as {actual}")]
    ScriptMismatch {
        /// The id recorded when the script was first loaded.
        expected: String,
        /// The id the server returned on reload.
        actual: String,
    },

    /// A request argument could not be encoded.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the offending argument.
        message: String,
    },

    /// The connection or client was closed.
    #[error("connection closed")]
    Closed,
}

impl Error {
    /// Rebuilds an equivalent error. `io::Error` is not `Clone`, so fanning
    /// one transport failure out to every queued request reconstructs it
    /// from its kind and message.
    pub(crate) fn reclone(&self) -> Self {
        match self {
            Error::Io { source } => Error::Io {
                source: io::Error::new(source.kind(), source.to_string()),
            },
            Error::Protocol { message } => Error::Protocol {
                message: message.clone(),
            },
            Error::Server { message } => Error::Server {
                message: message.clone(),
            },
            Error::ScriptMismatch { expected, actual } => Error::ScriptMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Error::InvalidArgument { message } => Error::InvalidArgument {
                message: message.clone(),
            },
            Error::Closed => Error::Closed,
        }
    }

    /// Returns the server error text, if this is a server error.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Error::Server { message } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let error = Error::Io { source: io_err };
        assert!(error.to_string().contains("io error"));
    }

    #[test]
    fn test_error_display_server() {
        let error = Error::Server {
            message: "ERR wrong type".to_string(),
        };
        assert_eq!(error.to_string(), "server error: ERR wrong type");
    }

    #[test]
    fn test_error_display_script_mismatch() {
        let error = Error::ScriptMismatch {
            expected: "abc".to_string(),
            actual: "def".to_string(),
        };
        assert_eq!(error.to_string(), "script abc reloaded as def");
    }

    #[test]
    fn test_error_reclone_io_keeps_kind() {
        let error = Error::Io {
            source: io::Error::new(io::ErrorKind::BrokenPipe, "gone"),
        };
        match error.reclone() {
            Error::Io { source } => assert_eq!(source.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_message() {
        let error = Error::Server {
            message: "MOVED 1 127.0.0.1:7001".to_string(),
        };
        assert_eq!(error.server_message(), Some("MOVED 1 127.0.0.1:7001"));
        assert!(Error::Closed.server_message().is_none());
    }
}
