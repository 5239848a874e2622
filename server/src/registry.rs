//! The set of joined connections.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connection::{Connection, ConnectionId};

/// Concurrency-safe set of connections that completed the handshake.
///
/// Membership decides who receives broadcasts and who appears in the roster.
/// All access goes through one lock, which is never held while writing to a
/// socket: broadcasts copy the member list first and send afterwards.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Members>>,
}

#[derive(Default)]
struct Members {
    by_id: HashMap<ConnectionId, Member>,
    next_seq: u64,
    sealed: bool,
}

struct Member {
    seq: u64,
    connection: Arc<Connection>,
}

impl Members {
    /// Members in join order.
    fn ordered(&self) -> Vec<&Member> {
        let mut members: Vec<&Member> = self.by_id.values().collect();
        members.sort_by_key(|member| member.seq);
        members
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Returns `false` once the registry has been closed
    /// by server shutdown, in which case the caller still owns the
    /// connection and must close it.
    pub async fn add(&self, connection: Arc<Connection>) -> bool {
        let mut members = self.inner.lock().await;
        if members.sealed {
            return false;
        }

        let seq = members.next_seq;
        members.next_seq += 1;
        members.by_id.insert(connection.id(), Member { seq, connection });
        true
    }

    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut members = self.inner.lock().await;
        members.by_id.remove(&id).map(|member| member.connection)
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.lock().await.by_id.contains_key(&id)
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.by_id.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current members in join order, optionally leaving one out.
    pub async fn snapshot(&self, excluding: Option<ConnectionId>) -> Vec<Arc<Connection>> {
        let members = self.inner.lock().await;
        members
            .ordered()
            .into_iter()
            .filter(|member| Some(member.connection.id()) != excluding)
            .map(|member| Arc::clone(&member.connection))
            .collect()
    }

    /// Sends `message` to every current member except `excluding`.
    ///
    /// Membership is captured first and the lock released before any send,
    /// so a member that leaves mid-broadcast may still be addressed; its
    /// closed connection drops the line.
    pub async fn snapshot_broadcast(&self, message: &str, excluding: Option<ConnectionId>) {
        for connection in self.snapshot(excluding).await {
            connection.send(message).await;
        }
    }

    /// Names of current members in join order. Members without a name yet
    /// are skipped.
    pub async fn names(&self) -> Vec<String> {
        let members = self.inner.lock().await;
        members
            .ordered()
            .into_iter()
            .filter_map(|member| member.connection.name().map(str::to_string))
            .collect()
    }

    /// Closes every member and empties the registry. Later `add` calls are
    /// refused. Returns how many connections were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut members = self.inner.lock().await;
            members.sealed = true;
            let mut drained: Vec<Member> = members.by_id.drain().map(|(_, member)| member).collect();
            drained.sort_by_key(|member| member.seq);
            drained.into_iter().map(|member| member.connection).collect()
        };

        for connection in &drained {
            connection.close().await;
        }

        drained.len()
    }
}
