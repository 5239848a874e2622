use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use chatroom_server::{ChatServer, Config, console};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatroom_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Chat server failed");
            ExitCode::FAILURE
        }
    };

    // The console task parks a blocking thread on stdin until the next line.
    runtime.shutdown_background();
    code
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    info!(
        bind_address = %config.bind_address,
        bind_attempts = config.bind_attempts,
        "Configuration loaded"
    );

    let server = Arc::new(ChatServer::new(config));

    info!("Type 'done' to shutdown the server");
    tokio::spawn(console::watch_console(
        BufReader::new(tokio::io::stdin()),
        Arc::clone(&server),
    ));
    tokio::spawn(console::watch_ctrl_c(Arc::clone(&server)));

    Arc::clone(&server).serve().await?;
    server.wait_stopped().await;

    info!("Server stopped");
    Ok(())
}
