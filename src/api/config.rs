//! Configuration types for relay endpoints
//!
//! The crate never collects these values itself; a caller (CLI flags, a
//! form, a config file) fills them in and validation runs before any
//! socket work begins. An invalid configuration means start/connect simply
//! does not proceed.

use crate::error::ConfigError;
use crate::network::FramingMode;
use serde::{Deserialize, Serialize};

/// Configuration for a relay server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name or IP address to bind
    pub address: String,

    /// Port to bind; 0 selects a random available port
    pub port: u16,

    /// The operator's display name, used when broadcasting from the
    /// server itself. Required and non-empty.
    pub username: String,

    /// Shared secret clients must present. An empty secret accepts any
    /// key. Compared verbatim, never used to encrypt anything.
    pub secret: String,

    /// Message boundary rule; both ends must agree
    #[serde(default)]
    pub framing: FramingMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 0,
            username: String::new(),
            secret: String::new(),
            framing: FramingMode::default(),
        }
    }
}

impl ServerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `address` or `username` is empty.
    /// The port needs no check; the type already bounds it.
    pub fn validate(&self) -> crate::Result<()> {
        validate_common(&self.address, &self.username)
    }
}

/// Configuration for a relay client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host name or IP address of the server
    pub address: String,

    /// Server port
    pub port: u16,

    /// Display name presented in the handshake. Required and non-empty;
    /// the server truncates names longer than 200 characters.
    pub username: String,

    /// Shared secret presented in the handshake. May be empty, but a
    /// server configured with a secret will reject an empty key all the
    /// same — the strings differ.
    pub key: String,

    /// Message boundary rule; both ends must agree
    #[serde(default)]
    pub framing: FramingMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 0,
            username: String::new(),
            key: String::new(),
            framing: FramingMode::default(),
        }
    }
}

impl ClientConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `address` or `username` is empty.
    pub fn validate(&self) -> crate::Result<()> {
        validate_common(&self.address, &self.username)
    }
}

fn validate_common(address: &str, username: &str) -> crate::Result<()> {
    if address.trim().is_empty() {
        return Err(ConfigError::MissingRequiredField {
            field: "address".to_string(),
        }
        .into());
    }
    if username.trim().is_empty() {
        return Err(ConfigError::MissingRequiredField {
            field: "username".to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 0);
        assert!(config.username.is_empty());
        assert!(config.secret.is_empty());
        assert_eq!(config.framing, FramingMode::Availability);
    }

    #[test]
    fn test_server_config_requires_username() {
        let config = ServerConfig::default();
        assert!(config.validate().is_err());

        let config = ServerConfig {
            username: "operator".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_requires_address() {
        let config = ServerConfig {
            address: "  ".to_string(),
            username: "operator".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_config_key_is_optional() {
        let config = ClientConfig {
            username: "alice".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.key.is_empty());
    }

    #[test]
    fn test_client_config_requires_username() {
        let config = ClientConfig::default();
        assert!(matches!(
            config.validate(),
            Err(crate::Error::Config(ConfigError::MissingRequiredField { .. }))
        ));
    }

    #[test]
    fn test_framing_mode_serde_names() {
        let json = serde_json::to_string(&FramingMode::LineDelimited).unwrap();
        assert_eq!(json, r#""linedelimited""#);

        let parsed: FramingMode = serde_json::from_str(r#""availability""#).unwrap();
        assert_eq!(parsed, FramingMode::Availability);
    }
}
