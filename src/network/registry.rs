//! Live-peer registry
//!
//! The one piece of state mutated by multiple connection workers
//! concurrently. An entry's presence is the sole authority for "this peer
//! should receive broadcasts": every entry is authenticated, inserted
//! exactly once after its handshake succeeds, and removed exactly once by
//! the same worker when the connection terminates.

use crate::network::SendQueue;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// One authenticated, currently connected peer.
///
/// The id is assigned at accept time, strictly increasing and never
/// reused; the identity is set once during the handshake and immutable
/// thereafter. Nothing here is mutated in place after insertion.
#[derive(Debug)]
pub struct RegisteredPeer {
    id: u64,
    username: String,
    outbound: SendQueue,
    close: Notify,
}

impl RegisteredPeer {
    /// Bundle an authenticated connection's identity and send handle
    pub fn new(id: u64, username: impl Into<String>, outbound: SendQueue) -> Self {
        Self {
            id,
            username: username.into(),
            outbound,
            close: Notify::new(),
        }
    }

    /// Connection id, unique for the lifetime of the server
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Display name established by the handshake
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Submit a directed write through this peer's send chain
    pub fn send(&self, message: &str) {
        self.outbound.send(message);
    }

    /// Ask the owning worker to tear this connection down.
    ///
    /// Cooperative: the worker observes the signal at its next suspension
    /// point, exits its read loop and cleans up. Safe to call repeatedly
    /// and from any task.
    pub fn request_close(&self) {
        self.close.notify_one();
    }

    /// Resolve when a close has been requested.
    ///
    /// A request made while the worker was busy elsewhere is not lost; the
    /// stored permit completes the next call immediately.
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

/// Concurrent map of connection id to live peer.
///
/// Mutated only by the accept path (insert) and the disconnect path
/// (remove), read concurrently by the broadcaster. Iteration tolerates
/// concurrent insert and remove from other workers.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    peers: DashMap<u64, Arc<RegisteredPeer>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Add an authenticated peer. Called once per id, never for an id
    /// already present.
    pub fn insert(&self, peer: Arc<RegisteredPeer>) {
        self.peers.insert(peer.id(), peer);
    }

    /// Remove a peer, returning it if it was present. Called once, from
    /// the worker that inserted it.
    pub fn remove(&self, id: u64) -> Option<Arc<RegisteredPeer>> {
        self.peers.remove(&id).map(|(_, peer)| peer)
    }

    /// Look up a single peer by id
    pub fn get(&self, id: u64) -> Option<Arc<RegisteredPeer>> {
        self.peers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Clone out the current peer set.
    ///
    /// The broadcaster fans out over this snapshot so no registry lock is
    /// held across socket I/O.
    pub fn snapshot(&self) -> Vec<Arc<RegisteredPeer>> {
        self.peers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of authenticated, not-yet-disconnected peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peers are registered
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
