//! Common test helpers and utilities
//!
//! Shared fixtures for the integration suite: servers bound to a random
//! loopback port, clients pointed at them, and an event recorder that
//! captures everything a handler sees.

use parking_lot::Mutex;
use parley::{Client, ClientBuilder, Event, Server, ServerBuilder};
use std::sync::Arc;
use std::time::Duration;

/// Records every event a server or client dispatches
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler closure that appends into this recorder
    pub fn record(&self) -> impl Fn(Event) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event| events.lock().push(event)
    }

    /// Everything recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// The `Log` lines recorded so far
    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Log { line } => Some(line),
                _ => None,
            })
            .collect()
    }

    /// Whether any recorded log line contains `needle`.
    ///
    /// Substring matching keeps assertions valid even when availability
    /// framing coalesces two messages into one line.
    pub fn contains_line(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    /// The id a `PeerJoined` event reported for `username`, if any
    pub fn joined_id(&self, username: &str) -> Option<u64> {
        self.events().into_iter().find_map(|event| match event {
            Event::PeerJoined { id, username: name } if name == username => Some(id),
            _ => None,
        })
    }
}

/// Start a server on a random loopback port, recording its events from
/// the very first dispatch
pub async fn start_server(secret: &str) -> (Server, EventLog) {
    let mut server = ServerBuilder::new()
        .with_address("127.0.0.1")
        .with_port(0)
        .with_username("operator")
        .with_secret(secret)
        .build()
        .unwrap();

    let log = EventLog::new();
    server.on_event(log.record());
    server.start().await.unwrap();

    (server, log)
}

/// Build a client aimed at `server` without connecting it
pub fn client_for(server: &Server, username: &str, key: &str) -> (Client, EventLog) {
    let addr = server.local_addr().expect("server must be started");

    let mut client = ClientBuilder::new()
        .with_address(addr.ip().to_string())
        .with_port(addr.port())
        .with_username(username)
        .with_key(key)
        .build()
        .unwrap();

    let log = EventLog::new();
    client.on_event(log.record());

    (client, log)
}

/// Connect and authenticate a client against `server`
pub async fn connect_client(server: &Server, username: &str, key: &str) -> (Client, EventLog) {
    let (mut client, log) = client_for(server, username, key);
    client.connect().await.unwrap();
    (client, log)
}

/// Poll `condition` until it holds or two seconds elapse
pub async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Give in-flight deliveries a moment, for asserting that something did
/// NOT happen
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}
