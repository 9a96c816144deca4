//! Relay server
//!
//! A [`Server`] binds a TCP listener, runs the accept loop, and owns the
//! registry of authenticated peers. Each accepted socket gets its own
//! worker task: handshake first, then the steady-state read loop that
//! relays every completed message to all other registered peers. All
//! per-connection failures stay inside that connection's worker; nothing a
//! single peer does can take down the accept loop or another connection.

use crate::api::config::ServerConfig;
use crate::api::events::{error_msg, system_msg, Event, EventHandlers, SubscriptionHandle};
use crate::error::{ConfigError, NetworkError};
use crate::network::{
    Broadcaster, ClientRegistry, Connection, FramingMode, RegisteredPeer, SendQueue,
    ACCEPT_POLL_INTERVAL,
};
use crate::protocol::{serialize_status, AuthResponse, HandshakeState};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Current operational state of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Built but never started
    Created,
    /// Binding the listener
    Starting,
    /// Accept loop running
    Running,
    /// Stopped; existing connections may still be relaying
    Stopped,
}

/// Builder for [`Server`] instances
///
/// # Examples
///
/// ```no_run
/// use parley::ServerBuilder;
///
/// # async fn example() -> parley::Result<()> {
/// let mut server = ServerBuilder::new()
///     .with_address("0.0.0.0")
///     .with_port(9000)
///     .with_username("operator")
///     .with_secret("s3cret")
///     .build()?;
///
/// server.start().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the host name or IP address to bind
    pub fn with_address<S: Into<String>>(mut self, address: S) -> Self {
        self.config.address = address.into();
        self
    }

    /// Set the port to bind (0 selects a random available port)
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the operator's display name (required)
    pub fn with_username<S: Into<String>>(mut self, username: S) -> Self {
        self.config.username = username.into();
        self
    }

    /// Set the shared secret clients must present (empty accepts any key)
    pub fn with_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.config.secret = secret.into();
        self
    }

    /// Set the message boundary rule
    pub fn with_framing(mut self, framing: FramingMode) -> Self {
        self.config.framing = framing;
        self
    }

    /// Validate the configuration and build the server.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required field is missing. No socket
    /// work happens here.
    pub fn build(self) -> crate::Result<Server> {
        self.config.validate()?;

        Ok(Server {
            config: self.config,
            event_handlers: EventHandlers::new(),
            state: Arc::new(RwLock::new(ServerState::Created)),
            registry: Arc::new(ClientRegistry::new()),
            broadcaster: RwLock::new(None),
            next_id: Arc::new(AtomicU64::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
            local_addr: Arc::new(RwLock::new(None)),
        })
    }
}

/// Everything a connection worker needs, shared across all workers
struct Shared {
    registry: Arc<ClientRegistry>,
    broadcaster: Broadcaster,
    events: EventHandlers,
    secret: String,
    framing: FramingMode,
}

/// A relay server: accept loop, handshake gate, peer registry and
/// broadcast path.
pub struct Server {
    config: ServerConfig,
    event_handlers: EventHandlers,
    state: Arc<RwLock<ServerState>>,
    registry: Arc<ClientRegistry>,
    /// Spawned on first start and kept across stop/start cycles, so
    /// relaying between surviving connections outlives the accept loop.
    broadcaster: RwLock<Option<Broadcaster>>,
    /// Advanced only by the accept loop; ids are never reused, including
    /// across stop/start cycles.
    next_id: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    local_addr: Arc<RwLock<Option<SocketAddr>>>,
}

impl Server {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind the listener and start accepting connections.
    ///
    /// Idempotent: starting a server that is already running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address does not resolve or the
    /// listener cannot bind; the server is left stopped and may be started
    /// again.
    pub async fn start(&mut self) -> crate::Result<()> {
        {
            let mut state = self.state.write();
            if *state == ServerState::Running || *state == ServerState::Starting {
                return Ok(());
            }
            *state = ServerState::Starting;
        }

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.write() = ServerState::Stopped;
                return Err(e);
            }
        };

        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                *self.state.write() = ServerState::Stopped;
                return Err(NetworkError::ConnectionFailed {
                    address: self.config.address.clone(),
                    reason: format!("Failed to get local address: {}", e),
                }
                .into());
            }
        };
        *self.local_addr.write() = Some(local_addr);

        let broadcaster = {
            let mut slot = self.broadcaster.write();
            match slot.as_ref() {
                Some(broadcaster) => broadcaster.clone(),
                None => {
                    let broadcaster = Broadcaster::spawn(Arc::clone(&self.registry));
                    *slot = Some(broadcaster.clone());
                    broadcaster
                }
            }
        };

        let shared = Arc::new(Shared {
            registry: Arc::clone(&self.registry),
            broadcaster,
            events: self.event_handlers.clone(),
            secret: self.config.secret.clone(),
            framing: self.config.framing,
        });

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let next_id = Arc::clone(&self.next_id);
        tokio::spawn(accept_loop(listener, stop, next_id, shared));

        *self.state.write() = ServerState::Running;
        info!("listening on {}", local_addr);
        self.event_handlers.dispatch(Event::ServerStarted);
        self.event_handlers.dispatch(Event::Log {
            line: system_msg("Server has started"),
        });

        Ok(())
    }

    /// Stop accepting new connections.
    ///
    /// Idempotent: stopping a server that is not running is a no-op.
    /// Already-established connections are left alive and keep relaying;
    /// use [`Server::disconnect_all`] to drop them.
    pub fn stop(&mut self) {
        {
            let mut state = self.state.write();
            if *state != ServerState::Running {
                return;
            }
            *state = ServerState::Stopped;
        }

        self.stop.store(true, Ordering::SeqCst);
        self.event_handlers.dispatch(Event::ServerStopped);
        self.event_handlers.dispatch(Event::Log {
            line: system_msg("Server has stopped"),
        });
    }

    /// Get the current operational state
    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    /// Address the listener is bound to, once started.
    ///
    /// Useful when the configured port was 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    // ========================================================================
    // Relaying and roster control
    // ========================================================================

    /// Number of authenticated, currently connected peers
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Broadcast a chat message from the operator to every registered
    /// peer. The wire form is `"<operator>: <message>"`, same as relayed
    /// client traffic; no peer is excluded.
    pub fn broadcast(&self, message: &str) {
        if let Some(broadcaster) = self.broadcaster.read().as_ref() {
            let line = format!("{}: {}", self.config.username, message);
            broadcaster.broadcast(line, None);
        }
    }

    /// Ask one peer's worker to tear its connection down.
    ///
    /// Cooperative and asynchronous: the registry entry disappears once
    /// the worker has observed the request and cleaned up. Unknown ids are
    /// a no-op.
    pub fn disconnect_peer(&self, id: u64) {
        if let Some(peer) = self.registry.get(id) {
            debug!("disconnect requested for {} ({})", peer.username(), id);
            peer.request_close();
        }
    }

    /// Ask every peer's worker to tear its connection down
    pub fn disconnect_all(&self) {
        for peer in self.registry.snapshot() {
            peer.request_close();
        }
    }

    // ========================================================================
    // Event system
    // ========================================================================

    /// Register an event handler.
    ///
    /// Returns a handle usable with [`Server::unsubscribe`].
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

    async fn bind(&self) -> crate::Result<TcpListener> {
        let mut addrs = lookup_host((self.config.address.as_str(), self.config.port))
            .await
            .map_err(|_| ConfigError::InvalidAddress {
                address: self.config.address.clone(),
            })?;
        let addr = addrs.next().ok_or_else(|| ConfigError::InvalidAddress {
            address: self.config.address.clone(),
        })?;

        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|e| NetworkError::ConnectionFailed {
                    address: addr.to_string(),
                    reason: format!("Failed to bind listener: {}", e),
                })?;

        Ok(listener)
    }
}

/// Accept inbound connections until told to stop.
///
/// Waits for an accept under a short timeout so the stop flag is checked
/// at a fixed interval while idle. Ids come from a counter only this loop
/// advances. Stopping abandons the listener but never touches connections
/// that were already handed to their workers.
async fn accept_loop(
    listener: TcpListener,
    stop: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
    shared: Arc<Shared>,
) {
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let accepted = match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            // Idle tick; go around and re-check the stop flag.
            Err(_) => continue,
            Ok(Err(e)) => {
                warn!("accept failed: {}", e);
                shared.events.dispatch(Event::Log {
                    line: error_msg(&e.to_string()),
                });
                continue;
            }
            Ok(Ok(accepted)) => accepted,
        };

        if stop.load(Ordering::SeqCst) {
            // Raced a stop request; this socket never became a connection.
            break;
        }

        let (stream, peer_addr) = accepted;
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        debug!("accepted {} as connection {}", peer_addr, id);

        let shared = Arc::clone(&shared);
        tokio::spawn(run_connection(id, stream, shared));
    }

    debug!("accept loop stopped");
}

/// Per-connection worker: handshake, then relay until the connection dies.
async fn run_connection(id: u64, stream: TcpStream, shared: Arc<Shared>) {
    let peer_label = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| format!("connection {}", id));

    let (mut connection, write_half) = match Connection::from_stream(stream, shared.framing) {
        Ok(pair) => pair,
        Err(e) => {
            shared.events.dispatch(Event::Log {
                line: error_msg(&e.to_string()),
            });
            return;
        }
    };
    let outbound = SendQueue::spawn(write_half, peer_label);

    // No relaying happens until the handshake resolves; a connection that
    // fails it is dropped here without ever entering the registry.
    let username = match authorize(id, &mut connection, &outbound, &shared).await {
        Some(username) => username,
        None => return,
    };

    let peer = Arc::new(RegisteredPeer::new(id, username.clone(), outbound));
    shared.registry.insert(Arc::clone(&peer));
    shared.events.dispatch(Event::PeerJoined {
        id,
        username: username.clone(),
    });
    let notice = format!("{} has connected", username);
    shared.events.dispatch(Event::Log {
        line: system_msg(&notice),
    });
    shared.broadcaster.broadcast(system_msg(&notice), Some(id));

    loop {
        tokio::select! {
            result = connection.read_message() => match result {
                Ok(text) => {
                    let line = format!("{}: {}", username, text);
                    shared.events.dispatch(Event::Log { line: line.clone() });
                    shared.broadcaster.broadcast(line, Some(id));
                }
                Err(NetworkError::ConnectionReset) => break,
                Err(e) => {
                    shared.events.dispatch(Event::Log {
                        line: error_msg(&e.to_string()),
                    });
                    break;
                }
            },
            _ = peer.closed() => break,
        }
    }

    shared.registry.remove(id);
    shared.events.dispatch(Event::PeerLeft { id });
    let notice = format!("{} has disconnected", username);
    shared.events.dispatch(Event::Log {
        line: system_msg(&notice),
    });
    // The departure notice goes out without the SYSTEM prefix; receiving
    // clients render it as-is.
    shared.broadcaster.broadcast(notice, Some(id));
}

/// Run the server side of the credential exchange.
///
/// Reads exactly one complete message (the read loop underneath keeps
/// going until one arrives or the socket dies), evaluates it, and replies
/// with the authorized status on success. Returns the authenticated
/// display name, or `None` when the connection was rejected or lost —
/// either way the caller just drops it.
async fn authorize(
    id: u64,
    connection: &mut Connection,
    outbound: &SendQueue,
    shared: &Shared,
) -> Option<String> {
    let state = HandshakeState::Connecting.credential_requested();

    let raw = match connection.read_message().await {
        Ok(raw) => raw,
        Err(NetworkError::ConnectionReset) => {
            debug!("connection {} closed before authorization", id);
            return None;
        }
        Err(e) => {
            shared.events.dispatch(Event::Log {
                line: error_msg(&e.to_string()),
            });
            return None;
        }
    };

    match state.credential_received(&raw, &shared.secret) {
        HandshakeState::Authenticated { username } => {
            let reply = match serialize_status(&AuthResponse::authorized()) {
                Ok(reply) => reply,
                Err(e) => {
                    shared.events.dispatch(Event::Log {
                        line: error_msg(&e.to_string()),
                    });
                    return None;
                }
            };
            outbound.send(reply);
            Some(username)
        }
        _ => {
            debug!("connection {} failed authorization", id);
            shared.events.dispatch(Event::Log {
                line: system_msg(&format!("Connection {} failed authorization", id)),
            });
            None
        }
    }
}
