//! Terminal front end for a relay client.
//!
//! Prints every relayed line to stdout and sends whatever is typed on
//! stdin.
//!
//! ```text
//! cargo run --example relay-client -- --username alice --key s3cret
//! ```

use anyhow::Result;
use clap::Parser;
use parley::{ClientBuilder, ClientState, Event};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay-client", about = "Authenticated chat relay client")]
struct Args {
    /// Server address
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Server port
    #[arg(long, default_value_t = 9000)]
    port: u16,

    /// Display name to authenticate as
    #[arg(long)]
    username: String,

    /// Shared secret (leave empty for open servers)
    #[arg(long, default_value = "")]
    key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut client = ClientBuilder::new()
        .with_address(args.address.clone())
        .with_port(args.port)
        .with_username(args.username.clone())
        .with_key(args.key.clone())
        .build()?;

    client.on_event(|event| {
        if let Event::Log { line } = event {
            println!("{}", line);
        }
    });

    client.connect().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        if client.state() != ClientState::Connected {
            break;
        }
        println!("{} (You): {}", args.username, line);
        client.send(&line)?;
    }

    client.disconnect();
    Ok(())
}
