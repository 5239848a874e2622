//! Listening socket, accept loop and coordinated shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::Connection;
use crate::errors::ServerError;
use crate::registry::Registry;
use crate::session;

const LISTEN_BACKLOG: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Binding,
    Accepting,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Idle | Self::Binding | Self::Accepting)
    }
}

/// The chat server.
///
/// Owns the [`Registry`] and the lifecycle state. Share it behind an `Arc`
/// between the accept loop and whatever triggers [`ChatServer::shutdown`]
/// (operator console, signal handler, or the accept loop's own fault path).
pub struct ChatServer {
    config: Config,
    registry: Registry,
    state: watch::Sender<LifecycleState>,
    stop_accepting: CancellationToken,
    close_sessions: CancellationToken,
}

impl ChatServer {
    pub fn new(config: Config) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            config,
            registry: Registry::new(),
            state,
            stop_accepting: CancellationToken::new(),
            close_sessions: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Binds the configured address, retrying while the port is busy.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        self.advance(LifecycleState::Binding);
        bind_with_retry(
            self.config.bind_address,
            self.config.bind_attempts,
            self.config.bind_retry_delay,
        )
        .await
    }

    /// Binds, then accepts until shutdown.
    pub async fn serve(self: Arc<Self>) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.run(listener).await
    }

    /// Accepts connections until shutdown, spawning one session per client.
    ///
    /// Sessions are not awaited. The listener is dropped, and so closed, when
    /// this returns.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        if !self.advance(LifecycleState::Accepting) {
            debug!("Shutdown requested before the accept loop started");
            return Ok(());
        }

        match listener.local_addr() {
            Ok(addr) => info!(%addr, "Chat server is running"),
            Err(e) => warn!(error = %e, "Chat server is running on an unknown address"),
        }

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.stop_accepting.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.spawn_session(stream, peer),
                // The listener going away is expected once shutdown has begun.
                Err(_) if !self.is_running() => break,
                Err(e) if is_transient_accept_error(&e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
                Err(e) => {
                    error!(error = %e, "Accept loop failed, shutting down");
                    drop(listener);
                    self.shutdown().await;
                    return Err(ServerError::Accept(e));
                }
            }
        }

        drop(listener);
        info!("Server stopped accepting connections");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        info!(%peer, "New client connected");
        let connection = Arc::new(Connection::with_shutdown(stream, peer, &self.close_sessions));
        let registry = self.registry.clone();
        tokio::spawn(session::handle_connection(connection, registry));
    }

    /// Stops the server: closes every client, joined or still naming
    /// itself, stops the accept loop (which closes the listener) and waits
    /// out the grace period.
    ///
    /// Only the first call does anything and returns `true`; concurrent or
    /// later calls return `false` immediately.
    pub async fn shutdown(&self) -> bool {
        let began = self.state.send_if_modified(|state| {
            if state.is_running() {
                *state = LifecycleState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if !began {
            debug!("Shutdown already in progress");
            return false;
        }

        info!("Shutting down server...");

        let closed = self.registry.close_all().await;
        debug!(clients = closed, "Closed client connections");
        // Ends sessions still in the handshake, including any accepted from
        // here until the accept loop stops.
        self.close_sessions.cancel();

        self.stop_accepting.cancel();

        tokio::time::sleep(self.config.shutdown_grace).await;

        self.state.send_replace(LifecycleState::Stopped);
        info!("Server resources released");
        true
    }

    /// Resolves once shutdown has fully completed.
    pub async fn wait_stopped(&self) {
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = state
            .wait_for(|state| *state == LifecycleState::Stopped)
            .await;
    }

    /// Moves forward to `next` unless shutdown has already begun.
    fn advance(&self, next: LifecycleState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_running() && *state != next {
                *state = next;
                true
            } else {
                false
            }
        }) || *self.state.borrow() == next
    }
}

/// Binds `addr` with address reuse enabled.
///
/// A busy port is retried up to `attempts` times in total with `delay`
/// between tries. Any other bind error fails at once.
pub async fn bind_with_retry(
    addr: SocketAddr,
    attempts: u32,
    delay: Duration,
) -> Result<TcpListener, ServerError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match bind_reusable(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                if attempt >= attempts {
                    error!(%addr, attempts, "Failed to bind, port might be in use");
                    return Err(ServerError::BindExhausted { addr, attempts });
                }
                warn!(
                    %addr,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Port is busy, waiting before retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(source) => return Err(ServerError::Bind { addr, source }),
        }
    }
}

fn bind_reusable(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Errors tied to one incoming connection rather than the listener.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
