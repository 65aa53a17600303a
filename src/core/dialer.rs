use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A bidirectional byte stream a connection can run over.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// A boxed [`Stream`].
pub type BoxStream = Box<dyn Stream>;

/// Future returned by [`Dialer::dial`].
pub type DialFuture<'a> = Pin<Box<dyn Future<Output = io::Result<BoxStream>> + Send + 'a>>;

/// Opens the transport a [`Connection`](crate::core::Connection) runs on.
///
/// The dialer is injected per connection, which is what lets tests swap in
/// scripted transports and deployments use unix sockets.
pub trait Dialer: Send + Sync + 'static {
    /// Opens a fresh stream to the peer.
    fn dial(&self) -> DialFuture<'_>;
}

/// Dials a TCP peer at a fixed `host:port` address.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    /// Creates a dialer for `addr`. A leading `tcp://` or `redis://`
    /// scheme is stripped; only `host:port` is kept.
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let addr = addr
            .strip_prefix("tcp://")
            .or_else(|| addr.strip_prefix("redis://"))
            .map(str::to_string)
            .unwrap_or(addr);
        Self { addr }
    }

    /// The target address as `host:port`.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Dialer for TcpDialer {
    fn dial(&self) -> DialFuture<'_> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.addr).await?;
            Ok(Box::new(stream) as BoxStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_dialer_strips_scheme() {
        assert_eq!(TcpDialer::new("tcp://127.0.0.1:6379").addr(), "127.0.0.1:6379");
        assert_eq!(TcpDialer::new("redis://127.0.0.1:6379").addr(), "127.0.0.1:6379");
        assert_eq!(TcpDialer::new("127.0.0.1:6379").addr(), "127.0.0.1:6379");
    }
}
