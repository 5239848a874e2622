//! One accepted client socket with line-oriented reads and writes.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ConnectionError;

pub type ConnectionId = Uuid;

type LineReader = Lines<BufReader<OwnedReadHalf>>;
type LineWriter = BufWriter<OwnedWriteHalf>;

/// A client connection.
///
/// Identity is the [`ConnectionId`], never the display name: names are
/// cosmetic and may repeat. The reader is only driven by the owning session,
/// while the writer is shared with every broadcast path and serialised by
/// its own lock so lines from concurrent broadcasts never interleave.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    name: OnceLock<String>,
    reader: Mutex<Option<LineReader>>,
    writer: Mutex<Option<LineWriter>>,
    open: AtomicBool,
    closed: CancellationToken,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self::with_closed(stream, peer, CancellationToken::new())
    }

    /// Creates a connection that also ends when `shutdown` is cancelled,
    /// whether or not it has joined the registry yet.
    pub fn with_shutdown(stream: TcpStream, peer: SocketAddr, shutdown: &CancellationToken) -> Self {
        Self::with_closed(stream, peer, shutdown.child_token())
    }

    fn with_closed(stream: TcpStream, peer: SocketAddr, closed: CancellationToken) -> Self {
        let (read_half, write_half) = stream.into_split();

        Self {
            id: Uuid::new_v4(),
            peer,
            name: OnceLock::new(),
            reader: Mutex::new(Some(BufReader::new(read_half).lines())),
            writer: Mutex::new(Some(BufWriter::new(write_half))),
            open: AtomicBool::new(true),
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Display name, absent until the handshake completes.
    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    /// Assigns the display name. Only the first call has any effect.
    pub fn set_name(&self, name: String) -> bool {
        self.name.set(name).is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Writes one line to the client.
    ///
    /// A closed connection silently drops the line, as does a write that
    /// races with [`Connection::close`]. Write faults are logged and left for
    /// the session's next read to notice.
    pub async fn send(&self, line: &str) {
        if !self.is_open() {
            return;
        }

        let mut writer = self.writer.lock().await;
        let Some(out) = writer.as_mut() else {
            return;
        };

        let result = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return,
            result = write_line(out, line) => result,
        };

        if let Err(e) = result {
            debug!(connection_id = %self.id, peer = %self.peer, error = %e, "Dropping line for client");
        }
    }

    /// Reads the next line.
    ///
    /// `Ok(None)` means the stream ended, either because the peer hung up or
    /// because the connection was closed locally. Once the stream has ended
    /// or failed the reader is released and every later call returns
    /// `Ok(None)`.
    pub async fn read_line(&self) -> Result<Option<String>, ConnectionError> {
        let mut reader = self.reader.lock().await;
        let Some(lines) = reader.as_mut() else {
            return Ok(None);
        };

        let outcome = tokio::select! {
            biased;
            _ = self.closed.cancelled() => Ok(None),
            line = lines.next_line() => line.map_err(ConnectionError::Read),
        };

        if !matches!(outcome, Ok(Some(_))) {
            reader.take();
        }

        outcome
    }

    /// Closes the connection. Safe to call any number of times from any task.
    ///
    /// Cancellation wakes a pending read or send first, then the writer and
    /// reader are released independently: a failure on one does not stop
    /// the other. The socket itself closes once both halves are dropped.
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.closed.cancel();

        if let Some(out) = self.writer.lock().await.take() {
            let mut write_half = out.into_inner();
            if let Err(e) = write_half.shutdown().await.map_err(ConnectionError::Close) {
                debug!(connection_id = %self.id, peer = %self.peer, error = %e, "Error closing client writer");
            }
        }

        // A pending read holds the lock; it releases the reader itself once
        // it observes the cancellation.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }
}

async fn write_line(out: &mut LineWriter, line: &str) -> Result<(), ConnectionError> {
    out.write_all(line.as_bytes())
        .await
        .map_err(ConnectionError::Write)?;
    out.write_all(b"\n").await.map_err(ConnectionError::Write)?;
    out.flush().await.map_err(ConnectionError::Write)?;
    Ok(())
}
