//! Operator controls: the `done` console command and Ctrl-C.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::protocol;
use crate::server::ChatServer;

/// Reads operator commands from `input` until `done` or end of input.
///
/// `done` (any case) shuts the server down. Anything else is ignored. End of
/// input stops watching but leaves the server running.
pub async fn watch_console<R>(input: R, server: Arc<ChatServer>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if protocol::is_shutdown_command(&line) => {
                info!("Shutdown requested from console");
                server.shutdown().await;
                return;
            }
            Ok(Some(line)) => debug!(command = %line.trim(), "Ignoring unknown console command"),
            Ok(None) => {
                debug!("Console input closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                return;
            }
        }
    }
}

/// Shuts the server down on Ctrl-C.
pub async fn watch_ctrl_c(server: Arc<ChatServer>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupt received");
            server.shutdown().await;
        }
        Err(e) => warn!(error = %e, "Unable to listen for Ctrl-C"),
    }
}
