//! Terminal front end for a relay server.
//!
//! Prints the event stream to stdout and broadcasts whatever the operator
//! types on stdin.
//!
//! ```text
//! cargo run --example relay-server -- --port 9000 --secret s3cret
//! ```

use anyhow::Result;
use clap::Parser;
use parley::{Event, ServerBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay-server", about = "Authenticated chat relay server")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Port to bind (0 picks a random port)
    #[arg(long, default_value_t = 9000)]
    port: u16,

    /// Operator display name
    #[arg(long, default_value = "operator")]
    username: String,

    /// Shared secret clients must present (empty accepts anyone)
    #[arg(long, default_value = "")]
    secret: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut server = ServerBuilder::new()
        .with_address(args.address.clone())
        .with_port(args.port)
        .with_username(args.username.clone())
        .with_secret(args.secret.clone())
        .build()?;

    server.on_event(|event| match event {
        Event::Log { line } => println!("{}", line),
        Event::PeerJoined { id, username } => println!("roster + [{}] {}", id, username),
        Event::PeerLeft { id } => println!("roster - [{}]", id),
        _ => {}
    });

    server.start().await?;
    if let Some(addr) = server.local_addr() {
        println!("listening on {} — type to broadcast, ctrl-d to quit", addr);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        println!("{} (You): {}", args.username, line);
        server.broadcast(&line);
    }

    server.stop();
    server.disconnect_all();
    Ok(())
}
