//! Authorization handshake state machine
//!
//! A short-lived protocol run once per new connection. The first complete
//! message on a fresh connection is interpreted as an [`AuthRequest`]; the
//! server either replies with an authorized status or closes the socket
//! without a word. No chat traffic may flow until the handshake resolves.

use crate::protocol::{deserialize_credentials, AuthRequest, MAX_USERNAME_LEN};

/// Progress of the credential exchange for one connection.
///
/// Transitions: `Connecting → AwaitingCredential → Authenticated | Rejected`.
/// The two terminal states never transition further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Socket accepted, no read armed yet
    Connecting,
    /// Waiting for the credential payload to arrive
    AwaitingCredential,
    /// Credential accepted; the connection may enter the registry
    Authenticated {
        /// Display name extracted from the credential, truncated to
        /// [`MAX_USERNAME_LEN`] characters
        username: String,
    },
    /// Credential refused or unreadable; the connection must be closed
    Rejected,
}

impl HandshakeState {
    /// Arm the first read: `Connecting → AwaitingCredential`.
    ///
    /// Any other state is returned unchanged.
    pub fn credential_requested(self) -> Self {
        match self {
            Self::Connecting => Self::AwaitingCredential,
            other => other,
        }
    }

    /// Consume the received credential payload (server side).
    ///
    /// Accepts when the display name is non-empty and the presented key
    /// equals `shared_secret` exactly (case-sensitive). An empty configured
    /// secret accepts any key. A payload that fails to parse rejects, same
    /// as a bad credential.
    ///
    /// Only meaningful from `AwaitingCredential`; terminal states are
    /// returned unchanged and `Connecting` rejects (no credential was ever
    /// requested).
    pub fn credential_received(self, raw: &str, shared_secret: &str) -> Self {
        match self {
            Self::AwaitingCredential => match deserialize_credentials(raw) {
                Ok(request) => evaluate(&request, shared_secret),
                Err(_) => Self::Rejected,
            },
            Self::Connecting => Self::Rejected,
            terminal => terminal,
        }
    }

    /// Whether the handshake has resolved one way or the other
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated { .. } | Self::Rejected)
    }
}

/// Server-side acceptance predicate
fn evaluate(request: &AuthRequest, shared_secret: &str) -> HandshakeState {
    if request.username.is_empty() {
        return HandshakeState::Rejected;
    }
    if !shared_secret.is_empty() && request.key != shared_secret {
        return HandshakeState::Rejected;
    }

    HandshakeState::Authenticated {
        username: truncate_username(&request.username),
    }
}

/// Truncate an identity to [`MAX_USERNAME_LEN`] characters, never splitting
/// a character
fn truncate_username(username: &str) -> String {
    if username.chars().count() <= MAX_USERNAME_LEN {
        username.to_string()
    } else {
        username.chars().take(MAX_USERNAME_LEN).collect()
    }
}

/// Client-side acceptance predicate: does this raw reply grant access?
///
/// A payload that fails to parse does not authorize, but it does not fail
/// the handshake either — the client keeps reading until an authorized
/// status arrives or the socket dies.
pub fn status_authorizes(raw: &str) -> bool {
    crate::protocol::deserialize_status(raw)
        .map(|response| response.is_authorized())
        .unwrap_or(false)
}
