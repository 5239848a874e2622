use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chatroom_server::{ChatServer, Config, LifecycleState, protocol};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    server: Arc<ChatServer>,
    addr: SocketAddr,
    accept_loop: JoinHandle<Result<(), chatroom_server::ServerError>>,
}

impl TestServer {
    async fn start() -> Self {
        let server = Arc::new(ChatServer::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            shutdown_grace: Duration::ZERO,
            ..Config::default()
        }));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_loop = tokio::spawn(Arc::clone(&server).run(listener));

        Self {
            server,
            addr,
            accept_loop,
        }
    }
}

struct TestClient {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connects and consumes the name prompt without answering it.
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut client = Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        };
        assert_eq!(client.recv().await.as_deref(), Some(protocol::NAME_PROMPT));
        client
    }

    /// Connects, names itself and consumes its own roster line.
    async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(name).await;
        let roster = client.recv().await.unwrap();
        assert!(roster.starts_with(protocol::ROSTER_PREFIX), "got {roster:?}");
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap_or(None)
    }

    async fn expect(&mut self, expected: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn test_join_announces_and_publishes_roster() {
    let test = TestServer::start().await;

    let mut alice = TestClient::join(test.addr, "alice").await;
    let mut bob = TestClient::connect(test.addr).await;
    bob.send("bob").await;

    alice.expect("bob has joined the chat.").await;
    alice.expect("PARTICIPANTS: alice bob").await;
    bob.expect("PARTICIPANTS: alice bob").await;
}

#[tokio::test]
async fn test_message_reaches_others_but_not_sender() {
    let test = TestServer::start().await;

    let mut a = TestClient::join(test.addr, "A").await;
    let mut b = TestClient::join(test.addr, "B").await;
    a.expect("B has joined the chat.").await;
    a.expect("PARTICIPANTS: A B").await;

    a.send("hello").await;
    b.expect("A: hello").await;

    b.send("exit").await;
    // Had A received its own message it would show up before the departure.
    a.expect("B has left the chat.").await;
    a.expect("PARTICIPANTS: A").await;
}

#[tokio::test]
async fn test_exit_sends_nothing_further_to_departed_client() {
    let test = TestServer::start().await;

    let mut a = TestClient::join(test.addr, "A").await;
    let mut b = TestClient::join(test.addr, "B").await;
    a.expect("B has joined the chat.").await;
    a.expect("PARTICIPANTS: A B").await;

    b.send("exit").await;

    assert_eq!(b.recv().await, None);
    a.expect("B has left the chat.").await;
    a.expect("PARTICIPANTS: A").await;
    assert_eq!(test.server.registry().names().await, vec!["A"]);
}

#[tokio::test]
async fn test_abrupt_disconnect_is_treated_like_exit() {
    let test = TestServer::start().await;

    let mut a = TestClient::join(test.addr, "A").await;
    let b = TestClient::join(test.addr, "B").await;
    a.expect("B has joined the chat.").await;
    a.expect("PARTICIPANTS: A B").await;

    drop(b);

    a.expect("B has left the chat.").await;
    a.expect("PARTICIPANTS: A").await;
}

#[tokio::test]
async fn test_handshake_abandonment_is_silent() {
    let test = TestServer::start().await;

    let mut a = TestClient::join(test.addr, "A").await;
    let ghost = TestClient::connect(test.addr).await;
    drop(ghost);

    let mut c = TestClient::connect(test.addr).await;
    c.send("C").await;

    // The ghost never joined, so the next thing A hears is C.
    a.expect("C has joined the chat.").await;
    a.expect("PARTICIPANTS: A C").await;
    c.expect("PARTICIPANTS: A C").await;
}

#[tokio::test]
async fn test_only_empty_lines_are_skipped() {
    let test = TestServer::start().await;

    let mut a = TestClient::join(test.addr, "A").await;
    let mut b = TestClient::join(test.addr, "B").await;
    a.expect("B has joined the chat.").await;
    a.expect("PARTICIPANTS: A B").await;

    a.send("").await;
    a.send("   ").await;
    a.send("x").await;

    b.expect("A:    ").await;
    b.expect("A: x").await;
}

#[tokio::test]
async fn test_duplicate_names_both_appear_in_roster() {
    let test = TestServer::start().await;

    let mut first = TestClient::join(test.addr, "sam").await;
    let mut second = TestClient::connect(test.addr).await;
    second.send("sam").await;

    first.expect("sam has joined the chat.").await;
    first.expect("PARTICIPANTS: sam sam").await;
    second.expect("PARTICIPANTS: sam sam").await;
}

#[tokio::test]
async fn test_roster_matches_registry_after_churn() {
    let test = TestServer::start().await;

    let mut observer = TestClient::join(test.addr, "observer").await;
    let mut clients = Vec::new();
    for name in ["c1", "c2", "c3", "c4"] {
        clients.push(TestClient::join(test.addr, name).await);
        observer.expect(&format!("{name} has joined the chat.")).await;
        observer.recv().await;
    }

    // c2 and c4 leave, c1 and c3 stay.
    let c4 = clients.pop().unwrap();
    let _c3 = clients.pop().unwrap();
    let mut c2 = clients.pop().unwrap();
    c2.send("exit").await;
    observer.expect("c2 has left the chat.").await;
    observer.expect("PARTICIPANTS: observer c1 c3 c4").await;
    drop(c4);
    observer.expect("c4 has left the chat.").await;
    observer.expect("PARTICIPANTS: observer c1 c3").await;

    assert_eq!(
        test.server.registry().names().await,
        vec!["observer", "c1", "c3"]
    );
}

#[tokio::test]
async fn test_shutdown_disconnects_everyone_once() {
    let test = TestServer::start().await;

    let mut a = TestClient::join(test.addr, "A").await;
    let mut b = TestClient::join(test.addr, "B").await;
    a.expect("B has joined the chat.").await;
    a.expect("PARTICIPANTS: A B").await;

    let (first, second) = tokio::join!(test.server.shutdown(), test.server.shutdown());
    assert!(first ^ second);
    assert_eq!(test.server.state(), LifecycleState::Stopped);

    assert_eq!(a.recv().await, None);
    assert_eq!(b.recv().await, None);
    assert!(test.server.registry().names().await.is_empty());
    assert!(test.accept_loop.await.unwrap().is_ok());
    assert!(TcpStream::connect(test.addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_closes_clients_still_in_handshake() {
    let test = TestServer::start().await;

    let mut pending = TestClient::connect(test.addr).await;

    assert!(test.server.shutdown().await);
    assert_eq!(test.server.state(), LifecycleState::Stopped);

    assert_eq!(pending.recv().await, None);
}
