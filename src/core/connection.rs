use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::dialer::{BoxStream, Dialer};
use crate::core::request::Request;
use crate::proto::codec::{CommandEncoder, ReplyDecoder};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Reply;
use crate::proto::value::Value;

/// Configuration for a [`Connection`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ConnectionConfig {
    /// Upper bound on requests in flight on the wire. The reader queue
    /// never grows past this.
    pub max_concurrent_requests: usize,
    /// Size of the producer queue. Submitters block once it is full.
    pub max_pending_requests: usize,
    /// Dial or write attempts per request before the connection fails.
    pub max_connection_retries: u32,
    /// Base backoff; attempt `n` sleeps `n * retry_timeout`.
    pub retry_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 1000,
            max_pending_requests: 1000,
            max_connection_retries: 3,
            retry_timeout: Duration::from_secs(1),
        }
    }
}

/// A request travelling through the connection with its completion signal.
struct Job {
    request: Request,
    done: oneshot::Sender<Request>,
}

impl Job {
    fn fail(mut self, err: &Error) {
        self.request.fail_all(err);
        let _ = self.done.send(self.request);
    }
}

/// A cached Lua script: the id the server assigned and the source to
/// replay on reconnect.
#[derive(Clone)]
struct Script {
    id: String,
    code: String,
}

#[derive(Default)]
struct ConnState {
    queue: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

/// A pipelined connection to one server.
///
/// Many tasks may [`send`](Connection::send) concurrently over one TCP
/// socket. A single writer task drives the socket and a single reader task
/// drains it, so replies come back in the order commands were accepted.
/// The producer queue is bounded: submission blocks when the connection is
/// saturated.
///
/// The connection starts lazily on the first send. Dial and write failures
/// reconnect with linear backoff up to
/// [`max_connection_retries`](ConnectionConfig::max_connection_retries)
/// attempts; once exhausted the connection enters a failed state and every
/// queued or later request completes with the last transport error.
///
/// Scripts registered through [`lua_script`](Connection::lua_script) are
/// replayed on every reconnect before regular traffic resumes.
pub struct Connection {
    dialer: Arc<dyn Dialer>,
    config: ConnectionConfig,
    scripts: Arc<Mutex<Vec<Script>>>,
    state: Mutex<ConnState>,
}

impl Connection {
    /// Creates a connection that will dial through `dialer` on first use.
    pub fn new(dialer: impl Dialer, config: ConnectionConfig) -> Self {
        Self::with_dialer(Arc::new(dialer), config)
    }

    /// Creates a connection from a shared dialer.
    pub fn with_dialer(dialer: Arc<dyn Dialer>, config: ConnectionConfig) -> Self {
        Self {
            dialer,
            config,
            scripts: Arc::new(Mutex::new(Vec::new())),
            state: Mutex::new(ConnState::default()),
        }
    }

    /// Sends a request and waits for its completion.
    ///
    /// The returned request carries a result or an error for each of its
    /// commands. `Err` is only returned when the connection has been
    /// closed.
    pub async fn send(&self, mut request: Request) -> Result<Request> {
        request.begin_attempt();
        let queue = self.queue().await?;
        let (tx, rx) = oneshot::channel();
        let job = Job { request, done: tx };
        if queue.send(job).await.is_err() {
            return Err(Error::Closed);
        }
        rx.await.map_err(|_| Error::Closed)
    }

    /// Executes a single command and returns its reply.
    ///
    /// Server error replies surface as [`Error::Server`].
    pub async fn exec(&self, name: &str, args: Vec<Value>) -> Result<Reply> {
        let request = self.send(Request::new(name, args)).await?;
        request.into_last_result()
    }

    /// Loads a Lua script on the server and caches it.
    ///
    /// Returns the script id (its SHA1) for use with `EVALSHA`. The cache
    /// is additive; every cached script is reloaded and verified after a
    /// reconnect.
    pub async fn lua_script(&self, code: impl Into<String>) -> Result<String> {
        let code = code.into();
        let reply = self
            .exec("SCRIPT", vec!["LOAD".into(), code.clone().into()])
            .await?;
        let id = script_id(&reply)?;
        self.scripts.lock().await.push(Script {
            id: id.clone(),
            code,
        });
        Ok(id)
    }

    /// Closes the producer queue, lets in-flight requests finish, and
    /// joins the background workers. Idempotent.
    pub async fn close(&self) {
        let (queue, worker) = {
            let mut state = self.state.lock().await;
            state.closed = true;
            (state.queue.take(), state.worker.take())
        };
        drop(queue);
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    /// Lazily starts the worker and hands out the producer queue.
    async fn queue(&self) -> Result<mpsc::Sender<Job>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::Closed);
        }
        if let Some(queue) = &state.queue {
            return Ok(queue.clone());
        }

        let (tx, rx) = mpsc::channel(self.config.max_pending_requests);
        let worker = Worker {
            dialer: self.dialer.clone(),
            config: self.config.clone(),
            scripts: self.scripts.clone(),
        };
        state.worker = Some(tokio::spawn(worker.run(rx)));
        state.queue = Some(tx.clone());
        Ok(tx)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .finish()
    }
}

/// One live socket: the write half plus the reader task draining it.
struct Link {
    writer: WriteHalf<BoxStream>,
    encoder: CommandEncoder,
    inflight: mpsc::Sender<Job>,
    reader: JoinHandle<()>,
    broken: Arc<AtomicBool>,
}

impl Link {
    fn usable(&self) -> bool {
        !self.broken.load(Ordering::Acquire) && !self.inflight.is_closed()
    }

    async fn shutdown(self) {
        drop(self.inflight);
        let _ = self.reader.await;
    }
}

/// The single writer task behind a [`Connection`].
struct Worker {
    dialer: Arc<dyn Dialer>,
    config: ConnectionConfig,
    scripts: Arc<Mutex<Vec<Script>>>,
}

impl Worker {
    async fn run(self, mut queue: mpsc::Receiver<Job>) {
        let mut link: Option<Link> = None;

        while let Some(job) = queue.recv().await {
            if let Err(err) = self.dispatch(&mut link, job).await {
                // FAIL state: purge the queue and everything that arrives
                // later with the last transport error, until close.
                warn!(error = %err, "connection failed");
                if let Some(link) = link.take() {
                    link.shutdown().await;
                }
                while let Some(job) = queue.recv().await {
                    job.fail(&err);
                }
                return;
            }
        }

        if let Some(link) = link.take() {
            link.shutdown().await;
        }
    }

    /// Writes one request, reconnecting with backoff on dial or write
    /// failure. `Err` means the retry budget is spent (or the failure is
    /// fatal) and the connection must enter its failed state; the job has
    /// already been completed.
    async fn dispatch(&self, link: &mut Option<Link>, job: Job) -> Result<()> {
        let mut attempts: u32 = 0;

        loop {
            let mut live = match link.take() {
                Some(live) if live.usable() => live,
                other => {
                    if let Some(dead) = other {
                        dead.shutdown().await;
                    }
                    match self.connect().await {
                        Ok(live) => live,
                        Err(err) => {
                            attempts += 1;
                            if fatal(&err) || attempts >= self.config.max_connection_retries {
                                job.fail(&err);
                                return Err(err);
                            }
                            tokio::time::sleep(self.config.retry_timeout * attempts).await;
                            continue;
                        }
                    }
                }
            };

            // A marshal failure belongs to this request alone.
            if let Err(err) = job.request.encode(&mut live.encoder) {
                live.encoder.take();
                *link = Some(live);
                job.fail(&err);
                return Ok(());
            }

            let data = live.encoder.take();
            if let Err(err) = live.writer.write_all(&data).await {
                warn!(error = %err, attempts, "write failed, reconnecting");
                live.shutdown().await;
                attempts += 1;
                if attempts >= self.config.max_connection_retries {
                    let err = Error::Io { source: err };
                    job.fail(&err);
                    return Err(err);
                }
                tokio::time::sleep(self.config.retry_timeout * attempts).await;
                continue;
            }

            match live.inflight.send(job).await {
                Ok(()) => {
                    *link = Some(live);
                    return Ok(());
                }
                Err(mpsc::error::SendError(job)) => {
                    // The reader died after the bytes hit the wire. The
                    // command may have executed, so surface the failure
                    // rather than replaying it.
                    live.shutdown().await;
                    let err = Error::Io {
                        source: io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"),
                    };
                    job.fail(&err);
                    return Ok(());
                }
            }
        }
    }

    /// Dials a fresh socket, spawns its reader, and replays the script
    /// cache before any request traffic.
    async fn connect(&self) -> Result<Link> {
        let stream = self.dialer.dial().await?;
        debug!("connected");

        let (read_half, write_half) = tokio::io::split(stream);
        let broken = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(self.config.max_concurrent_requests);
        let reader = tokio::spawn(read_loop(read_half, rx, broken.clone()));

        let mut link = Link {
            writer: write_half,
            encoder: CommandEncoder::new(),
            inflight: tx,
            reader,
            broken,
        };
        self.reload_scripts(&mut link).await?;
        Ok(link)
    }

    /// Pipelines `SCRIPT LOAD` for every cached script and verifies the
    /// returned ids. A mismatch is fatal to the connection.
    async fn reload_scripts(&self, link: &mut Link) -> Result<()> {
        let scripts: Vec<Script> = self.scripts.lock().await.clone();
        if scripts.is_empty() {
            return Ok(());
        }
        debug!(count = scripts.len(), "reloading cached scripts");

        let mut request = Request::new(
            "SCRIPT",
            vec!["LOAD".into(), scripts[0].code.clone().into()],
        );
        for script in &scripts[1..] {
            request.add("SCRIPT", vec!["LOAD".into(), script.code.clone().into()]);
        }

        request.encode(&mut link.encoder)?;
        let data = link.encoder.take();
        link.writer.write_all(&data).await?;

        let (tx, rx) = oneshot::channel();
        link.inflight
            .send(Job { request, done: tx })
            .await
            .map_err(|_| Error::Closed)?;
        let request = rx.await.map_err(|_| Error::Closed)?;

        for (i, script) in scripts.iter().enumerate() {
            let reply = match request.result(i) {
                Some(reply) => reply,
                None => {
                    return Err(request.error().map(Error::reclone).unwrap_or(Error::Closed))
                }
            };
            let id = script_id(reply)?;
            if id != script.id {
                return Err(Error::ScriptMismatch {
                    expected: script.id.clone(),
                    actual: id,
                });
            }
        }
        Ok(())
    }
}

/// The single reader task: decodes replies in wire order and completes
/// requests. On a transport or protocol error it fails the current and all
/// in-flight requests and marks the link broken.
async fn read_loop(
    mut read: ReadHalf<BoxStream>,
    mut inflight: mpsc::Receiver<Job>,
    broken: Arc<AtomicBool>,
) {
    let mut decoder = ReplyDecoder::new();
    let mut buf = vec![0u8; 4096];

    while let Some(mut job) = inflight.recv().await {
        for i in 0..job.request.len() {
            match next_reply(&mut read, &mut decoder, &mut buf).await {
                Ok(reply) => job.request.set_reply(i, reply),
                Err(err) => {
                    broken.store(true, Ordering::Release);
                    job.request.fail_from(i, &err);
                    let _ = job.done.send(job.request);
                    inflight.close();
                    while let Some(job) = inflight.recv().await {
                        job.fail(&err);
                    }
                    return;
                }
            }
        }
        job.request.note_redirect();
        let _ = job.done.send(job.request);
    }
}

async fn next_reply(
    read: &mut ReadHalf<BoxStream>,
    decoder: &mut ReplyDecoder,
    buf: &mut [u8],
) -> Result<Reply> {
    loop {
        if let Some(reply) = decoder.decode()? {
            return Ok(reply);
        }
        let n = read.read(buf).await?;
        if n == 0 {
            return Err(Error::Protocol {
                message: "connection closed by peer".to_string(),
            });
        }
        decoder.append(&buf[..n]);
    }
}

/// Failures that must not be retried.
fn fatal(err: &Error) -> bool {
    matches!(err, Error::ScriptMismatch { .. })
}

fn script_id(reply: &Reply) -> Result<String> {
    match reply {
        Reply::Bulk(data) => String::from_utf8(data.to_vec()).map_err(|_| Error::Protocol {
            message: "script id is not valid utf-8".to_string(),
        }),
        Reply::Simple(s) => Ok(s.clone()),
        other => Err(Error::Protocol {
            message: format!("unexpected SCRIPT LOAD reply: {:?}", other),
        }),
    }
}
