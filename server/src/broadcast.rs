use crate::connection::ConnectionId;
use crate::protocol;
use crate::registry::Registry;

/// Fan-out of chat traffic and roster updates over the [`Registry`].
#[derive(Clone)]
pub struct Broadcaster {
    registry: Registry,
}

impl Broadcaster {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Sends `text` to every member except `excluding`.
    pub async fn announce(&self, text: &str, excluding: Option<ConnectionId>) {
        self.registry.snapshot_broadcast(text, excluding).await;
    }

    /// Sends the current roster to every member.
    pub async fn publish_roster(&self) {
        let names = self.registry.names().await;
        let roster = protocol::roster(names.iter().map(String::as_str));
        self.registry.snapshot_broadcast(&roster, None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{loopback, read_client_line};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publish_roster_reaches_everyone() {
        let registry = Registry::new();
        let broadcaster = Broadcaster::new(registry.clone());

        let (alice, mut alice_client) = loopback().await;
        alice.set_name("alice".to_string());
        let (bob, mut bob_client) = loopback().await;
        bob.set_name("bob".to_string());
        registry.add(Arc::new(alice)).await;
        registry.add(Arc::new(bob)).await;

        broadcaster.publish_roster().await;

        assert_eq!(
            read_client_line(&mut alice_client).await.as_deref(),
            Some("PARTICIPANTS: alice bob")
        );
        assert_eq!(
            read_client_line(&mut bob_client).await.as_deref(),
            Some("PARTICIPANTS: alice bob")
        );
    }

    #[tokio::test]
    async fn test_announce_excludes_sender() {
        let registry = Registry::new();
        let broadcaster = Broadcaster::new(registry.clone());

        let (alice, mut alice_client) = loopback().await;
        let alice = Arc::new(alice);
        let (bob, mut bob_client) = loopback().await;
        registry.add(Arc::clone(&alice)).await;
        registry.add(Arc::new(bob)).await;

        broadcaster.announce("alice: hello", Some(alice.id())).await;
        broadcaster.announce("bye", None).await;

        assert_eq!(read_client_line(&mut bob_client).await.as_deref(), Some("alice: hello"));
        assert_eq!(read_client_line(&mut alice_client).await.as_deref(), Some("bye"));
    }
}
