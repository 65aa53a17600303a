use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::core::dialer::{BoxStream, Dialer};
use crate::proto::codec::{CommandEncoder, ReplyDecoder};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Reply;
use crate::proto::value::Value;

/// How long to sleep before retrying a command that hit a `LOADING` reply.
const LOADING_RETRY: Duration = Duration::from_millis(10);

/// An unpipelined connection executing one command at a time.
///
/// This is the put/flush/get hook kept for tests and benchmarks; real
/// traffic goes through [`Connection`](crate::core::Connection). With
/// [`wait`](DirectConn::set_wait) enabled, a reply starting with `LOADING`
/// (a replica still loading its dataset) sleeps 10 ms and retries the same
/// command until it succeeds or fails differently.
pub struct DirectConn {
    stream: BoxStream,
    encoder: CommandEncoder,
    decoder: ReplyDecoder,
    wait: bool,
}

impl DirectConn {
    /// Wraps an already-open stream.
    pub fn new(stream: BoxStream) -> Self {
        Self {
            stream,
            encoder: CommandEncoder::new(),
            decoder: ReplyDecoder::new(),
            wait: false,
        }
    }

    /// Dials through `dialer` and wraps the resulting stream.
    pub async fn connect(dialer: &dyn Dialer) -> Result<Self> {
        let stream = dialer.dial().await?;
        Ok(Self::new(stream))
    }

    /// Enables or disables the `LOADING` retry loop.
    pub fn set_wait(&mut self, wait: bool) {
        self.wait = wait;
    }

    /// Buffers one command without writing it. Pipelining hook: pair with
    /// [`flush`](DirectConn::flush) and one [`get`](DirectConn::get) per
    /// buffered command.
    pub fn put(&mut self, name: &str, args: &[Value]) -> Result<()> {
        self.encoder.encode(name, args)
    }

    /// Writes everything buffered by [`put`](DirectConn::put).
    pub async fn flush(&mut self) -> Result<()> {
        let data = self.encoder.take();
        self.stream.write_all(&data).await?;
        Ok(())
    }

    /// Reads one reply. Server error replies surface as
    /// [`Error::Server`].
    pub async fn get(&mut self) -> Result<Reply> {
        let reply = self.read_reply().await?;
        match reply {
            Reply::Error(message) => Err(Error::Server { message }),
            reply => Ok(reply),
        }
    }

    /// Executes one command and returns its reply, honoring the `LOADING`
    /// retry loop when enabled.
    pub async fn exec(&mut self, name: &str, args: &[Value]) -> Result<Reply> {
        loop {
            self.put(name, args)?;
            self.flush().await?;
            let reply = self.read_reply().await?;

            if let Reply::Error(text) = &reply {
                if self.wait && text.starts_with("LOADING") {
                    tokio::time::sleep(LOADING_RETRY).await;
                    continue;
                }
                return Err(Error::Server {
                    message: text.clone(),
                });
            }
            return Ok(reply);
        }
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(reply) = self.decoder.decode()? {
                return Ok(reply);
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::Protocol {
                    message: "connection closed by peer".to_string(),
                });
            }
            self.decoder.append(&buf[..n]);
        }
    }
}
