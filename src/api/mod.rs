//! Public API module
//!
//! Contains the server and client endpoints, their configuration, and the
//! event system that carries log lines, roster changes and lifecycle
//! transitions out of the core.

pub mod client;
pub mod config;
pub mod events;
pub mod server;

pub use client::{Client, ClientBuilder, ClientState};
pub use config::{ClientConfig, ServerConfig};
pub use events::{error_msg, system_msg, Event, EventHandlers, SubscriptionHandle};
pub use server::{Server, ServerBuilder, ServerState};
