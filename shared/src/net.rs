//! Asynchronous TCP socket layer shared by server and client.
//!
//! Wraps each socket in a [`Connection`] owning a thread-safe,
//! line-oriented receive buffer, and reports everything that happens on
//! the wire as [`NetEvent`]s over an unbounded mpsc channel. The accept
//! cycle and per-connection read loops run on spawned tasks; at most one
//! receive is in flight per connection, and sends are fire-and-forget
//! but funnel through a single writer task per connection, so they
//! reach the wire in call order.

use log::warn;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

/// Deadline for an outbound connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Failure establishing a listener or an outbound connection. Errors on
/// established connections never surface here; they arrive as a single
/// [`NetEvent::Closed`] instead.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("could not resolve host {0:?}")]
    HostNotFound(String),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Connection state changes delivered to the owner of the event channel.
#[derive(Debug)]
pub enum NetEvent {
    /// A new inbound connection. Emitted once per accepted socket.
    Accepted(Connection),
    /// The accept cycle itself failed. Terminal; the listener does not
    /// re-arm.
    AcceptFailed { message: String },
    /// Bytes were appended to the connection's receive buffer.
    Data { id: u32 },
    /// The connection ended (peer close, read error, or local close).
    /// Emitted exactly once per connection.
    Closed { id: u32, message: String },
}

/// Operations queued to a connection's writer task.
#[derive(Debug)]
enum WriteOp {
    Data(String),
    Shutdown,
}

#[derive(Debug)]
struct ConnInner {
    /// Queue drained by the connection's single writer task. One writer
    /// per socket keeps sends in submission order.
    outgoing: UnboundedSender<WriteOp>,
    /// Append-only text accumulator drained by the protocol layer.
    buffer: StdMutex<String>,
    error: StdMutex<Option<String>>,
    connected: AtomicBool,
    /// Wakes the read loop once the writer side has shut down.
    closed: Notify,
}

/// One TCP socket plus its receive buffer and error state. Cheap to
/// clone; all clones share the same underlying socket.
#[derive(Debug, Clone)]
pub struct Connection {
    id: u32,
    peer: SocketAddr,
    inner: Arc<ConnInner>,
}

impl Connection {
    fn new(id: u32, peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        let (outgoing, ops) = mpsc::unbounded_channel();
        let inner = Arc::new(ConnInner {
            outgoing,
            buffer: StdMutex::new(String::new()),
            error: StdMutex::new(None),
            connected: AtomicBool::new(true),
            closed: Notify::new(),
        });
        spawn_writer(Arc::clone(&inner), writer, ops);
        Connection { id, peer, inner }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// The error message recorded when the connection ended, if any.
    pub fn error_message(&self) -> Option<String> {
        self.inner.error.lock().unwrap().clone()
    }

    fn set_error(&self, message: &str) {
        let mut slot = self.inner.error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(message.to_string());
        }
    }

    fn append_received(&self, text: &str) {
        self.inner.buffer.lock().unwrap().push_str(text);
    }

    /// Returns the entire receive buffer as text without consuming it.
    pub fn read_buffer(&self) -> String {
        self.inner.buffer.lock().unwrap().clone()
    }

    /// Removes the first `n` bytes from the receive buffer. Callers
    /// consume at line boundaries, so `n` always falls on a character
    /// boundary.
    pub fn consume(&self, n: usize) {
        let mut buffer = self.inner.buffer.lock().unwrap();
        let n = n.min(buffer.len());
        buffer.drain(..n);
    }

    pub fn clear_buffer(&self) {
        self.inner.buffer.lock().unwrap().clear();
    }

    /// Queues `data` on the connection's writer task. Consecutive sends
    /// reach the wire in call order. Returns false immediately if the
    /// connection is already closed. Completion is best-effort: a failed
    /// write closes the socket and the read loop reports `Closed` once,
    /// but no failure propagates to the caller.
    pub fn send(&self, data: impl Into<String>) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.inner.outgoing.send(WriteOp::Data(data.into())).is_ok()
    }

    /// Like [`send`](Self::send), but shuts the socket down after the
    /// queued data is written. The socket is closed exactly once on
    /// every path.
    pub fn send_and_close(&self, data: impl Into<String>) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        let sent = self.inner.outgoing.send(WriteOp::Data(data.into())).is_ok();
        let _ = self.inner.outgoing.send(WriteOp::Shutdown);
        sent
    }

    /// Closes the connection after any already queued sends. The
    /// in-flight receive is aborted and its read loop reports `Closed`
    /// exactly once.
    pub fn close(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        let _ = self.inner.outgoing.send(WriteOp::Shutdown);
    }
}

/// Runs the single writer task for one connection. All sends funnel
/// through here, so bytes reach the wire in submission order. The task
/// shuts the socket down exactly once, on whichever comes first: a
/// shutdown request, a write failure, or every handle being dropped.
fn spawn_writer(inner: Arc<ConnInner>, mut writer: OwnedWriteHalf, mut ops: UnboundedReceiver<WriteOp>) {
    tokio::spawn(async move {
        loop {
            match ops.recv().await {
                Some(WriteOp::Data(data)) => {
                    if writer.write_all(data.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Some(WriteOp::Shutdown) | None => break,
            }
        }
        inner.connected.store(false, Ordering::SeqCst);
        let _ = writer.shutdown().await;
        inner.closed.notify_one();
    });
}

/// Runs the receive loop for one connection: read, decode as UTF-8,
/// append under the buffer lock, emit `Data`. Zero bytes or a read
/// error ends the loop and emits `Closed` once.
fn spawn_reader(conn: Connection, mut reader: OwnedReadHalf, events: UnboundedSender<NetEvent>) {
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        let message = loop {
            tokio::select! {
                _ = conn.inner.closed.notified() => {
                    break "connection closed".to_string();
                }
                result = reader.read(&mut buf) => match result {
                    Ok(0) => break "connection closed by peer".to_string(),
                    Ok(n) => {
                        conn.append_received(&String::from_utf8_lossy(&buf[..n]));
                        if events.send(NetEvent::Data { id: conn.id }).is_err() {
                            return;
                        }
                    }
                    Err(e) => break e.to_string(),
                },
            }
        };
        conn.inner.connected.store(false, Ordering::SeqCst);
        conn.set_error(&message);
        let _ = events.send(NetEvent::Closed {
            id: conn.id,
            message,
        });
    });
}

/// Binds a listener and starts an unbounded accept cycle on a spawned
/// task. Each accepted socket becomes a `Connection` delivered via
/// [`NetEvent::Accepted`]; connection ids count up from zero. If
/// accepting fails the cycle emits one [`NetEvent::AcceptFailed`] and
/// stops. Returns the bound local address.
pub async fn start_listening(
    addr: &str,
    events: UnboundedSender<NetEvent>,
) -> Result<SocketAddr, NetError> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;

    tokio::spawn(async move {
        let mut next_id: u32 = 0;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to disable send coalescing for {}: {}", peer, e);
                    }
                    let (read_half, write_half) = stream.into_split();
                    let conn = Connection::new(next_id, peer, write_half);
                    next_id += 1;

                    spawn_reader(conn.clone(), read_half, events.clone());
                    if events.send(NetEvent::Accepted(conn)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = events.send(NetEvent::AcceptFailed {
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }
    });

    Ok(local)
}

/// Opens an outbound connection with send coalescing disabled,
/// preferring IPv4 addresses. Fails with exactly one error on DNS
/// failure, refusal, or the 3-second timeout; on timeout the socket is
/// dropped before this returns. The returned connection's receive loop
/// reports on the same event channel as a server-side connection.
pub async fn connect(
    host: &str,
    port: u16,
    events: UnboundedSender<NetEvent>,
) -> Result<Connection, NetError> {
    let candidates: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|_| NetError::HostNotFound(host.to_string()))?
        .collect();

    let addr = candidates
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| NetError::HostNotFound(host.to_string()))?;

    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(NetError::Io(e)),
        Err(_) => return Err(NetError::ConnectTimeout(CONNECT_TIMEOUT)),
    };
    stream.set_nodelay(true)?;

    let peer = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();
    let conn = Connection::new(0, peer, write_half);
    spawn_reader(conn.clone(), read_half, events);
    Ok(conn)
}
