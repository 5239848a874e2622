use std::fmt::{Display, Formatter};
use std::sync::Arc;

use anyhow::{Context, Result};
use chatroom_server::protocol;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

pub type MessageSender = mpsc::Sender<String>;
pub type EventReceiver = Arc<Mutex<mpsc::Receiver<ServerEvent>>>;

/// Something the view should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The socket is open.
    Connected,
    /// A new participant roster.
    Roster(Vec<String>),
    /// Any other server line: the name prompt, chat or a system notice.
    Line(String),
    /// The socket has closed.
    Disconnected,
}

impl ServerEvent {
    /// Classifies a line received from the server.
    pub fn from_line(line: &str) -> Self {
        match protocol::parse_roster(line) {
            Some(names) => ServerEvent::Roster(names),
            None => ServerEvent::Line(line.to_string()),
        }
    }
}

impl Display for ServerEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerEvent::Connected => f.write_str(protocol::CONNECTED_STATUS),
            ServerEvent::Roster(names) => write!(f, "Participants: {}", names.join(", ")),
            ServerEvent::Line(line) => f.write_str(line),
            ServerEvent::Disconnected => f.write_str(protocol::DISCONNECTED_STATUS),
        }
    }
}

/// Handle to a chatroom connection.
///
/// Outgoing lines and incoming events travel over channels serviced by
/// background tasks, so the handle can be cloned into any part of a view.
#[derive(Clone)]
pub struct Client {
    message_sender: MessageSender,
    event_receiver: EventReceiver,
}

impl Client {
    /// Opens a connection. The first line sent afterwards answers the
    /// server's name prompt.
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("Failed to connect to {}", address))?;

        let (read_half, write_half) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(100);
        let (incoming_tx, incoming_rx) = mpsc::channel::<ServerEvent>(100);

        // Queued before the reader starts so it is always the first event.
        let _ = incoming_tx.try_send(ServerEvent::Connected);

        Self::spawn_outgoing_handler(write_half, outgoing_rx);
        Self::spawn_incoming_handler(read_half, incoming_tx);

        Ok(Client {
            message_sender: outgoing_tx,
            event_receiver: Arc::new(Mutex::new(incoming_rx)),
        })
    }

    /// Connects and answers the name prompt with `name`.
    pub async fn join(address: &str, name: &str) -> Result<Self> {
        let client = Self::connect(address).await?;
        client.send_message(name).await?;
        Ok(client)
    }

    pub async fn send_message(&self, message: &str) -> Result<()> {
        self.message_sender
            .send(message.to_string())
            .await
            .with_context(|| "Failed to send message")
    }

    /// Leaves the chat. The server then closes the connection, which
    /// surfaces as [`ServerEvent::Disconnected`].
    pub async fn disconnect(&self) -> Result<()> {
        self.send_message(protocol::EXIT_COMMAND).await
    }

    pub async fn receive_event(&self) -> Option<ServerEvent> {
        self.event_receiver.lock().await.recv().await
    }

    fn spawn_outgoing_handler(
        mut write_half: OwnedWriteHalf,
        mut outgoing_rx: mpsc::Receiver<String>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let formatted_message = format!("{}\n", message);
                if write_half.write_all(formatted_message.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.flush().await.is_err() {
                    break;
                }
                if message == protocol::EXIT_COMMAND {
                    let _ = write_half.shutdown().await;
                    break;
                }
            }
        })
    }

    fn spawn_incoming_handler(
        read_half: OwnedReadHalf,
        incoming_tx: mpsc::Sender<ServerEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        debug!(line = %line, "Received line");
                        if incoming_tx.send(ServerEvent::from_line(&line)).await.is_err() {
                            return; // Receiver dropped
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "Connection error");
                        break;
                    }
                }
            }

            let _ = incoming_tx.send(ServerEvent::Disconnected).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roster_line() {
        assert_eq!(
            ServerEvent::from_line("PARTICIPANTS: alice bob"),
            ServerEvent::Roster(vec!["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn test_parse_empty_roster_line() {
        assert_eq!(ServerEvent::from_line("PARTICIPANTS:"), ServerEvent::Roster(vec![]));
    }

    #[test]
    fn test_parse_chat_line() {
        assert_eq!(
            ServerEvent::from_line("alice: PARTICIPANTS: nope"),
            ServerEvent::Line("alice: PARTICIPANTS: nope".to_string())
        );
    }

    #[test]
    fn test_status_lines_display() {
        assert_eq!(ServerEvent::Connected.to_string(), "Connected to server.");
        assert_eq!(ServerEvent::Disconnected.to_string(), "Disconnected from server.");
    }
}
