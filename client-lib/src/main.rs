//! Terminal front-end for the chatroom.
//!
//! Usage: `chatroom-client [address] [name]`. Without a name the server's
//! prompt is shown and the first typed line answers it.

use anyhow::Result;
use chatroom_client::{Client, ServerEvent};
use chatroom_server::protocol;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_ADDRESS: &str = "127.0.0.1:12345";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatroom_client=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let name = args.next();

    let client = match &name {
        Some(name) => Client::join(&address, name).await,
        None => Client::connect(&address).await,
    };
    let client = match client {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to connect to server: {e:#}");
            return Err(e);
        }
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut leaving = false;

    loop {
        tokio::select! {
            event = client.receive_event() => match event {
                Some(ServerEvent::Disconnected) | None => {
                    println!("{}", protocol::DISCONNECTED_STATUS);
                    break;
                }
                // A name given on the command line already answered the prompt.
                Some(ServerEvent::Line(line)) if name.is_some() && line == protocol::NAME_PROMPT => {}
                Some(event) => println!("{event}"),
            },
            line = input.next_line(), if !leaving => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) if line.trim() != protocol::EXIT_COMMAND => client.send_message(&line).await?,
                _ => {
                    leaving = true;
                    client.disconnect().await?;
                }
            },
        }
    }

    // stdin may still be parked on a blocking read.
    std::process::exit(0)
}
