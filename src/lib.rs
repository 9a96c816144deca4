//! # Parley
//!
//! A minimal authenticated chat relay over raw TCP. A [`Server`] accepts
//! connections, gates each one behind a shared-secret handshake, registers
//! the survivors and rebroadcasts whatever any of them says to all the
//! others; a [`Client`] connects, authenticates and exchanges
//! line-oriented text.
//!
//! The crate renders nothing: log lines, roster changes and lifecycle
//! transitions surface as [`Event`]s for the embedding application to
//! display however it likes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use parley::{Event, ServerBuilder};
//!
//! # async fn example() -> parley::Result<()> {
//! let mut server = ServerBuilder::new()
//!     .with_address("0.0.0.0")
//!     .with_port(9000)
//!     .with_username("operator")
//!     .with_secret("s3cret")
//!     .build()?;
//!
//! server.on_event(|event| {
//!     if let Event::Log { line } = event {
//!         println!("{}", line);
//!     }
//! });
//!
//! server.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Wire protocol
//!
//! Messages are plain UTF-8 text with no length prefix or delimiter; a
//! message ends when the receiving socket momentarily has nothing more
//! buffered. See [`FramingMode`] for the caveats and the opt-in
//! alternative. The one structured exchange is the handshake: the client
//! sends `{"username": ..., "key": ...}` and an accepting server replies
//! `{"status": "authorized"}`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod error;
pub mod network;
pub mod protocol;

// Re-export main types
pub use api::{
    error_msg, system_msg, Client, ClientBuilder, ClientConfig, ClientState, Event, EventHandlers,
    Server, ServerBuilder, ServerConfig, ServerState, SubscriptionHandle,
};
pub use error::{ConfigError, Error, HandshakeError, NetworkError, Result};
pub use network::FramingMode;
pub use protocol::{AuthRequest, AuthResponse, HandshakeState, ProtocolError};
