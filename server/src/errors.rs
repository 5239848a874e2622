//! Error types for the chat server.
//!
//! Session errors never leave their own session: a [`ConnectionError`] ends
//! one client's session and is only logged. [`ServerError`] is reserved for
//! faults that stop the whole server.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Transport fault on a single client connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Reading the next line failed.
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing or flushing a line failed.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// Shutting down the write side failed.
    #[error("close failed: {0}")]
    Close(#[source] io::Error),
}

/// Server-wide failure.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The port stayed busy for every bind attempt.
    #[error("failed to bind {addr} after {attempts} attempts, port might be in use")]
    BindExhausted { addr: SocketAddr, attempts: u32 },

    /// Binding failed for a reason retrying cannot fix.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The accept loop hit an unrecoverable error while running.
    #[error("accept loop failed: {0}")]
    Accept(#[source] io::Error),
}
