//! Network module
//!
//! Transport internals: message framing, the per-connection read loop, the
//! serialized send path and the live-peer registry. Everything here moves
//! plain UTF-8 text over raw TCP; there is no transport encryption.

mod connection;
mod framing;
mod registry;
mod sender;

pub use connection::Connection;
pub use framing::{FramingMode, MessageAccumulator};
pub use registry::{ClientRegistry, RegisteredPeer};
pub use sender::{Broadcaster, SendQueue};

/// Size of the per-connection receive buffer in bytes
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Maximum size of a single accumulated message (1 MB).
/// This bounds memory per connection against a peer that never pauses.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long the accept loop waits for an inbound connection before checking
/// whether it has been told to stop
pub const ACCEPT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(500);
