//! Relay client
//!
//! A [`Client`] opens one TCP connection to a relay server, presents its
//! credential, and — once authorized — surfaces every relayed line as an
//! event while accepting outbound text through its send chain. One read
//! task owns the connection; teardown is cooperative, triggered either by
//! the peer closing the socket or by [`Client::disconnect`].

use crate::api::config::ClientConfig;
use crate::api::events::{error_msg, system_msg, Event, EventHandlers, SubscriptionHandle};
use crate::error::{ConfigError, HandshakeError, NetworkError};
use crate::network::{Connection, SendQueue};
use crate::protocol::{serialize_credentials, status_authorizes, AuthRequest};
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Current operational state of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Built but never connected
    Created,
    /// Connecting and authenticating
    Connecting,
    /// Authorized; messages flow
    Connected,
    /// Connection torn down (or never authorized)
    Disconnected,
}

/// Builder for [`Client`] instances
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the server's host name or IP address
    pub fn with_address<S: Into<String>>(mut self, address: S) -> Self {
        self.config.address = address.into();
        self
    }

    /// Set the server port
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the display name presented in the handshake (required)
    pub fn with_username<S: Into<String>>(mut self, username: S) -> Self {
        self.config.username = username.into();
        self
    }

    /// Set the shared secret presented in the handshake (may be empty)
    pub fn with_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.key = key.into();
        self
    }

    /// Set the message boundary rule
    pub fn with_framing(mut self, framing: crate::network::FramingMode) -> Self {
        self.config.framing = framing;
        self
    }

    /// Validate the configuration and build the client.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required field is missing. No socket
    /// work happens here.
    pub fn build(self) -> crate::Result<Client> {
        self.config.validate()?;

        Ok(Client {
            config: self.config,
            event_handlers: EventHandlers::new(),
            state: Arc::new(RwLock::new(ClientState::Created)),
            active: Arc::new(Mutex::new(None)),
        })
    }
}

/// Live-connection handles, present only while connected
struct Active {
    outbound: SendQueue,
    close: Arc<Notify>,
}

/// A relay client: one authenticated connection to a server.
pub struct Client {
    config: ClientConfig,
    event_handlers: EventHandlers,
    state: Arc<RwLock<ClientState>>,
    active: Arc<Mutex<Option<Active>>>,
}

impl Client {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect to the server and authenticate.
    ///
    /// Sends the credential payload, then keeps reading until an
    /// authorized status arrives or the socket dies. Only after
    /// authorization does the steady-state read task start; no relayed
    /// traffic is surfaced before then.
    ///
    /// Idempotent: connecting while already connected (or mid-connect) is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::Unauthorized`] when the server closes the
    /// connection without granting access; [`NetworkError`] when the
    /// server cannot be reached.
    pub async fn connect(&mut self) -> crate::Result<()> {
        {
            let mut state = self.state.write();
            if *state == ClientState::Connected || *state == ClientState::Connecting {
                return Ok(());
            }
            *state = ClientState::Connecting;
        }

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.state.write() = ClientState::Disconnected;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> crate::Result<()> {
        let addr = self.resolve().await?;
        let (mut connection, write_half) =
            Connection::connect(addr, self.config.framing).await?;
        let outbound = SendQueue::spawn(write_half, addr.to_string());

        let request = AuthRequest {
            username: self.config.username.clone(),
            key: self.config.key.clone(),
        };
        outbound.send(serialize_credentials(&request)?);

        // Keep reading until the server authorizes us or hangs up. The
        // server sends nothing else before the status, but an unreadable
        // payload is not fatal — only a dead socket is.
        loop {
            match connection.read_message().await {
                Ok(raw) if status_authorizes(&raw) => break,
                Ok(_) => continue,
                Err(_) => {
                    self.event_handlers.dispatch(Event::Log {
                        line: system_msg("Unauthorized"),
                    });
                    return Err(HandshakeError::Unauthorized.into());
                }
            }
        }

        let close = Arc::new(Notify::new());
        *self.active.lock() = Some(Active {
            outbound,
            close: Arc::clone(&close),
        });
        *self.state.write() = ClientState::Connected;
        info!("connected to {}", addr);
        self.event_handlers.dispatch(Event::Connected);
        self.event_handlers.dispatch(Event::Log {
            line: system_msg("You are now connected"),
        });

        let events = self.event_handlers.clone();
        let state = Arc::clone(&self.state);
        let active = Arc::clone(&self.active);
        tokio::spawn(async move {
            read_loop(connection, close, &events).await;

            *active.lock() = None;
            *state.write() = ClientState::Disconnected;
            events.dispatch(Event::Disconnected);
            events.dispatch(Event::Log {
                line: system_msg("You are now disconnected"),
            });
        });

        Ok(())
    }

    /// Tear the connection down.
    ///
    /// Cooperative: the read task observes the request, drops the socket
    /// and dispatches [`Event::Disconnected`] once teardown is complete.
    /// Idempotent: disconnecting while not connected is a no-op.
    pub fn disconnect(&mut self) {
        if let Some(active) = self.active.lock().as_ref() {
            debug!("disconnect requested");
            active.close.notify_one();
        }
    }

    /// Get the current operational state
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Submit a chat message.
    ///
    /// Never blocks: the message enters this connection's send chain and
    /// goes out after anything already in flight. The server relays it to
    /// every other registered peer as `"<username>: <text>"`; it never
    /// comes back to this client.
    ///
    /// # Errors
    ///
    /// [`NetworkError::ConnectionClosed`] when not connected.
    pub fn send(&self, message: &str) -> crate::Result<()> {
        let active = self.active.lock();
        match active.as_ref() {
            Some(active) => {
                active.outbound.send(message);
                Ok(())
            }
            None => Err(NetworkError::ConnectionClosed {
                peer: format!("{}:{}", self.config.address, self.config.port),
            }
            .into()),
        }
    }

    // ========================================================================
    // Event system
    // ========================================================================

    /// Register an event handler.
    ///
    /// Returns a handle usable with [`Client::unsubscribe`].
    pub fn on_event<F>(&mut self, handler: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.event_handlers.subscribe(handler)
    }

    /// Unsubscribe an event handler
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.event_handlers.unsubscribe(handle);
    }

    async fn resolve(&self) -> crate::Result<SocketAddr> {
        let mut addrs = lookup_host((self.config.address.as_str(), self.config.port))
            .await
            .map_err(|_| ConfigError::InvalidAddress {
                address: self.config.address.clone(),
            })?;
        addrs
            .next()
            .ok_or_else(|| {
                ConfigError::InvalidAddress {
                    address: self.config.address.clone(),
                }
                .into()
            })
    }
}

/// Surface every relayed line until the connection dies or a close is
/// requested.
async fn read_loop(mut connection: Connection, close: Arc<Notify>, events: &EventHandlers) {
    loop {
        tokio::select! {
            result = connection.read_message() => match result {
                Ok(line) => {
                    events.dispatch(Event::Log { line });
                }
                Err(NetworkError::ConnectionReset) => break,
                Err(e) => {
                    events.dispatch(Event::Log {
                        line: error_msg(&e.to_string()),
                    });
                    break;
                }
            },
            _ = close.notified() => break,
        }
    }
}
