//! Multi-client text chatroom server.
//!
//! Clients connect over TCP, answer a name prompt, and from then on every
//! line they send is relayed to all other participants. A roster line
//! (`PARTICIPANTS: ...`) is pushed to everyone whenever someone joins or
//! leaves.
//!
//! # Architecture
//!
//! - [`ChatServer`] binds the listener, runs the accept loop and shuts down.
//! - One [`Session`] task per client runs the handshake/relay/teardown cycle.
//! - The [`Registry`] holds joined [`Connection`]s; [`Broadcaster`] fans out
//!   over a snapshot of it.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod console;
pub mod errors;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use broadcast::Broadcaster;
pub use config::{Config, ConfigError};
pub use connection::{Connection, ConnectionId};
pub use errors::{ConnectionError, ServerError};
pub use registry::Registry;
pub use server::{ChatServer, LifecycleState};
pub use session::{Session, SessionOutcome};
