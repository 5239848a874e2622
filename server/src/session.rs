//! Per-client session: name handshake, message relay, teardown.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::broadcast::Broadcaster;
use crate::connection::Connection;
use crate::errors::ConnectionError;
use crate::protocol;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Handshaking,
    Active,
    Closing,
    Closed,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The client left before naming itself. Nobody was told about it.
    Abandoned,
    /// The server was already shutting down when the handshake finished.
    Refused,
    /// The client sent the exit command.
    Left,
    /// The stream ended without an exit command.
    Disconnected,
    /// Reading from the client failed.
    Faulted(ConnectionError),
}

/// Drives one connection from handshake to teardown.
///
/// One session runs per accepted connection. Sessions only interact through
/// the shared [`Registry`]; a failure in one never reaches another.
pub struct Session {
    connection: Arc<Connection>,
    registry: Registry,
    broadcaster: Broadcaster,
    state: SessionState,
}

impl Session {
    pub fn new(connection: Arc<Connection>, registry: Registry) -> Self {
        let broadcaster = Broadcaster::new(registry.clone());
        Self {
            connection,
            registry,
            broadcaster,
            state: SessionState::Connecting,
        }
    }

    pub async fn run(mut self) -> SessionOutcome {
        let name = match self.handshake().await {
            Ok(name) => name,
            Err(outcome) => {
                self.transition(SessionState::Closing);
                self.connection.close().await;
                self.transition(SessionState::Closed);
                return outcome;
            }
        };

        let outcome = self.relay(&name).await;

        self.transition(SessionState::Closing);
        self.teardown(&name).await;
        self.transition(SessionState::Closed);

        outcome
    }

    /// Prompts for a name and joins the room.
    async fn handshake(&mut self) -> Result<String, SessionOutcome> {
        self.transition(SessionState::Handshaking);
        self.connection.send(protocol::NAME_PROMPT).await;

        let raw = match self.connection.read_line().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(peer = %self.connection.peer(), "Client left before sending a name");
                return Err(SessionOutcome::Abandoned);
            }
            Err(e) => {
                debug!(peer = %self.connection.peer(), error = %e, "Handshake read failed");
                return Err(SessionOutcome::Abandoned);
            }
        };

        let Some(name) = protocol::normalize_name(&raw) else {
            debug!(peer = %self.connection.peer(), "Client sent an empty name");
            return Err(SessionOutcome::Abandoned);
        };
        self.connection.set_name(name.clone());

        if !self.registry.add(Arc::clone(&self.connection)).await {
            debug!(peer = %self.connection.peer(), name = %name, "Server is shutting down, refusing join");
            return Err(SessionOutcome::Refused);
        }

        info!(peer = %self.connection.peer(), name = %name, "Client joined the chat");
        self.transition(SessionState::Active);

        self.broadcaster
            .announce(&protocol::joined(&name), Some(self.connection.id()))
            .await;
        self.broadcaster.publish_roster().await;

        Ok(name)
    }

    /// Relays the client's lines until it leaves or its stream ends.
    async fn relay(&mut self, name: &str) -> SessionOutcome {
        loop {
            match self.connection.read_line().await {
                Ok(Some(line)) if line == protocol::EXIT_COMMAND => return SessionOutcome::Left,
                Ok(Some(line)) if line.is_empty() => continue,
                Ok(Some(line)) => {
                    trace!(name = %name, "Relaying message");
                    self.broadcaster
                        .announce(&protocol::chat(name, &line), Some(self.connection.id()))
                        .await;
                }
                Ok(None) => return SessionOutcome::Disconnected,
                Err(e) => return SessionOutcome::Faulted(e),
            }
        }
    }

    /// Leaves the room. Removal happens before the departure broadcasts so
    /// the departing client neither hears them nor appears in the roster.
    /// Every step runs regardless of how the previous one went.
    async fn teardown(&mut self, name: &str) {
        self.registry.remove(self.connection.id()).await;
        self.broadcaster.announce(&protocol::left(name), None).await;
        self.broadcaster.publish_roster().await;
        self.connection.close().await;
    }

    fn transition(&mut self, next: SessionState) {
        trace!(connection_id = %self.connection.id(), from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }
}

/// Runs a session for a freshly accepted connection and logs how it ended.
pub async fn handle_connection(connection: Arc<Connection>, registry: Registry) {
    let peer = connection.peer();
    let outcome = Session::new(Arc::clone(&connection), registry).run().await;
    let name = connection.name().unwrap_or("<unnamed>");

    match outcome {
        SessionOutcome::Abandoned => debug!(peer = %peer, "Session ended before joining"),
        SessionOutcome::Refused => debug!(peer = %peer, "Session refused during shutdown"),
        SessionOutcome::Left => info!(peer = %peer, name = %name, "Client left the chat"),
        SessionOutcome::Disconnected => info!(peer = %peer, name = %name, "Client disconnected"),
        SessionOutcome::Faulted(e) => {
            warn!(peer = %peer, name = %name, error = %e, "Client connection failed");
        }
    }
}
