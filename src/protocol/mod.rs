//! Protocol module
//!
//! This module defines the structured payloads exchanged during the
//! authorization handshake and their JSON serialization. Steady-state chat
//! traffic is plain UTF-8 text and never passes through these types; only
//! the first exchange on a fresh connection is structured data.

pub mod handshake;

pub use handshake::{status_authorizes, HandshakeState};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to serialize a payload to JSON
    #[error("Failed to serialize payload: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize JSON into a payload
    #[error("Failed to deserialize payload: {0}")]
    DeserializationFailed(String),

    /// A payload field carried an unusable value
    #[error("Invalid field value: {0}")]
    InvalidFieldValue(String),
}

/// Maximum length of a display name, in characters.
///
/// Longer identities are truncated, not rejected.
pub const MAX_USERNAME_LEN: usize = 200;

/// Status value a server sends when it accepts a credential
pub const STATUS_AUTHORIZED: &str = "authorized";

/// Credential payload a client presents immediately after connecting.
///
/// The `key` is a plaintext shared secret compared verbatim against the
/// server's configured secret. It is not used to encrypt anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Display name, required and non-empty
    pub username: String,
    /// Shared secret, compared case-sensitively
    pub key: String,
}

/// Status payload a server sends back on successful authorization.
///
/// Nothing is sent on rejection; the connection is simply closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Authorization outcome; only `"authorized"` grants access
    pub status: String,
}

impl AuthResponse {
    /// The payload sent for a granted authorization
    pub fn authorized() -> Self {
        Self {
            status: STATUS_AUTHORIZED.to_string(),
        }
    }

    /// Whether this response grants access
    pub fn is_authorized(&self) -> bool {
        self.status == STATUS_AUTHORIZED
    }
}

/// Serialize a credential payload to its wire form
pub fn serialize_credentials(request: &AuthRequest) -> Result<String, ProtocolError> {
    serde_json::to_string(request).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
}

/// Deserialize a credential payload from its wire form.
///
/// Unknown fields are ignored; missing `username` or `key` is an error.
pub fn deserialize_credentials(text: &str) -> Result<AuthRequest, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
}

/// Serialize a status payload to its wire form
pub fn serialize_status(response: &AuthResponse) -> Result<String, ProtocolError> {
    serde_json::to_string(response).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
}

/// Deserialize a status payload from its wire form
pub fn deserialize_status(text: &str) -> Result<AuthResponse, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_round_trip() {
        let request = AuthRequest {
            username: "alice".to_string(),
            key: "s3cret".to_string(),
        };

        let wire = serialize_credentials(&request).unwrap();
        let parsed = deserialize_credentials(&wire).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_credentials_wire_shape() {
        let request = AuthRequest {
            username: "alice".to_string(),
            key: "s3cret".to_string(),
        };

        let wire = serialize_credentials(&request).unwrap();
        assert_eq!(wire, r#"{"username":"alice","key":"s3cret"}"#);
    }

    #[test]
    fn test_credentials_missing_key_rejected() {
        let result = deserialize_credentials(r#"{"username":"alice"}"#);
        assert!(matches!(
            result,
            Err(ProtocolError::DeserializationFailed(_))
        ));
    }

    #[test]
    fn test_credentials_unknown_fields_ignored() {
        let parsed =
            deserialize_credentials(r#"{"username":"alice","key":"","color":"teal"}"#).unwrap();
        assert_eq!(parsed.username, "alice");
        assert_eq!(parsed.key, "");
    }

    #[test]
    fn test_credentials_malformed_json() {
        assert!(deserialize_credentials("not json at all").is_err());
        assert!(deserialize_credentials("").is_err());
    }

    #[test]
    fn test_status_round_trip() {
        let response = AuthResponse::authorized();
        assert!(response.is_authorized());

        let wire = serialize_status(&response).unwrap();
        assert_eq!(wire, r#"{"status":"authorized"}"#);

        let parsed = deserialize_status(&wire).unwrap();
        assert!(parsed.is_authorized());
    }

    #[test]
    fn test_status_other_values_do_not_authorize() {
        let parsed = deserialize_status(r#"{"status":"denied"}"#).unwrap();
        assert!(!parsed.is_authorized());

        // Case-sensitive comparison
        let parsed = deserialize_status(r#"{"status":"Authorized"}"#).unwrap();
        assert!(!parsed.is_authorized());
    }
}
