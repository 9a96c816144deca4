//! Serialized send path
//!
//! Writes to one socket must be issued one at a time, in submission order.
//! Each connection gets a [`SendQueue`]: an unbounded channel drained by a
//! single writer task that owns the socket's write half. Submitting never
//! blocks the caller; ordering is guaranteed per queue and nowhere else.
//!
//! The server additionally owns one [`Broadcaster`] — a single fan-out task
//! that snapshots the registry per message and feeds each peer's queue, so
//! two broadcasts submitted in order reach every individual peer in that
//! order. No guarantee is made about relative order across different peers'
//! sockets, and no delivery guarantee is made at all: a write to a peer
//! whose socket died is logged and dropped, never retried.

use crate::network::ClientRegistry;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Handle for submitting writes to one connection, cheap to clone.
///
/// All clones feed the same writer task; the task exits when the socket
/// faults or every handle has been dropped.
#[derive(Debug, Clone)]
pub struct SendQueue {
    tx: mpsc::UnboundedSender<String>,
    peer: Arc<str>,
}

impl SendQueue {
    /// Spawn a writer task owning `writer` and return the submission
    /// handle. `peer` is a human-readable label used in log lines.
    pub fn spawn<W>(writer: W, peer: impl Into<String>) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let peer: Arc<str> = Arc::from(peer.into());
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let label = Arc::clone(&peer);
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(message) = rx.recv().await {
                if let Err(e) = writer.write_all(message.as_bytes()).await {
                    warn!("write to {} failed: {}", label, e);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    warn!("flush to {} failed: {}", label, e);
                    break;
                }
                trace!("wrote {} bytes to {}", message.len(), label);
            }
            // Dropping the receiver makes later submissions fail fast;
            // dropping the write half shuts the socket's send direction.
            debug!("writer for {} exited", label);
        });

        Self { tx, peer }
    }

    /// Submit a message for writing.
    ///
    /// Starts immediately if the queue is idle, otherwise runs after
    /// everything already submitted. If the peer's writer has exited the
    /// message is dropped and logged.
    pub fn send(&self, message: impl Into<String>) {
        if self.tx.send(message.into()).is_err() {
            debug!("{} is no longer connected; dropping write", self.peer);
        }
    }
}

/// Message destined for the broadcast fan-out
struct Outgoing {
    text: String,
    exclude: Option<u64>,
}

/// Fan-out path delivering one message to every registered peer.
///
/// A single consumer task drains submissions in order; for each it takes a
/// registry snapshot and feeds each peer's [`SendQueue`], skipping the
/// excluded id (the sender, for relayed traffic). `exclude = None`
/// broadcasts to every registered peer.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Broadcaster {
    /// Spawn the fan-out task over `registry` and return the handle
    pub fn spawn(registry: Arc<ClientRegistry>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();

        tokio::spawn(async move {
            while let Some(outgoing) = rx.recv().await {
                // Snapshot first: no registry lock is held across the
                // per-peer submissions.
                for peer in registry.snapshot() {
                    if outgoing.exclude == Some(peer.id()) {
                        continue;
                    }
                    peer.send(&outgoing.text);
                }
            }
        });

        Self { tx }
    }

    /// Submit a message for fan-out, excluding at most one peer id
    pub fn broadcast(&self, text: impl Into<String>, exclude: Option<u64>) {
        let outgoing = Outgoing {
            text: text.into(),
            exclude,
        };
        if self.tx.send(outgoing).is_err() {
            debug!("broadcast fan-out has shut down; dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::RegisteredPeer;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::time::{timeout, Duration};

    async fn read_available(read: &mut (impl tokio::io::AsyncRead + Unpin)) -> String {
        let mut buf = [0u8; 1024];
        let n = timeout(Duration::from_secs(1), read.read(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn test_send_queue_preserves_submission_order() {
        let (local, mut remote) = duplex(1024);
        let queue = SendQueue::spawn(local, "test peer");

        queue.send("a");
        queue.send("b");
        queue.send("c");

        let mut received = String::new();
        while received.len() < 3 {
            received.push_str(&read_available(&mut remote).await);
        }
        assert_eq!(received, "abc");
    }

    #[tokio::test]
    async fn test_send_to_dead_writer_is_dropped_not_an_error() {
        let (local, remote) = duplex(1024);
        let queue = SendQueue::spawn(local, "test peer");

        drop(remote);
        // The writer task may need a submission to notice the broken pipe.
        queue.send("first");
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.send("after death");
        // No panic, no error surfaced to the caller.
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::spawn(Arc::clone(&registry));

        let (alice_local, mut alice_remote) = duplex(1024);
        let (bob_local, mut bob_remote) = duplex(1024);
        registry.insert(Arc::new(RegisteredPeer::new(
            0,
            "alice",
            SendQueue::spawn(alice_local, "alice"),
        )));
        registry.insert(Arc::new(RegisteredPeer::new(
            1,
            "bob",
            SendQueue::spawn(bob_local, "bob"),
        )));

        broadcaster.broadcast("bob: hello", Some(1));

        assert_eq!(read_available(&mut alice_remote).await, "bob: hello");
        // Bob must not see his own message back.
        let mut buf = [0u8; 64];
        let bob_read = timeout(Duration::from_millis(200), bob_remote.read(&mut buf)).await;
        assert!(bob_read.is_err(), "sender received its own broadcast");
    }

    #[tokio::test]
    async fn test_broadcast_without_exclusion_reaches_everyone() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::spawn(Arc::clone(&registry));

        let (alice_local, mut alice_remote) = duplex(1024);
        let (bob_local, mut bob_remote) = duplex(1024);
        registry.insert(Arc::new(RegisteredPeer::new(
            0,
            "alice",
            SendQueue::spawn(alice_local, "alice"),
        )));
        registry.insert(Arc::new(RegisteredPeer::new(
            1,
            "bob",
            SendQueue::spawn(bob_local, "bob"),
        )));

        broadcaster.broadcast("operator: hi all", None);

        assert_eq!(read_available(&mut alice_remote).await, "operator: hi all");
        assert_eq!(read_available(&mut bob_remote).await, "operator: hi all");
    }

    #[tokio::test]
    async fn test_broadcast_skips_dead_peer_without_failing_others() {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::spawn(Arc::clone(&registry));

        let (dead_local, dead_remote) = duplex(64);
        let (live_local, mut live_remote) = duplex(1024);
        registry.insert(Arc::new(RegisteredPeer::new(
            0,
            "dead",
            SendQueue::spawn(dead_local, "dead"),
        )));
        registry.insert(Arc::new(RegisteredPeer::new(
            1,
            "live",
            SendQueue::spawn(live_local, "live"),
        )));

        drop(dead_remote);
        broadcaster.broadcast("ping", None);
        broadcaster.broadcast("pong", None);

        let mut received = String::new();
        while received.len() < 8 {
            received.push_str(&read_available(&mut live_remote).await);
        }
        assert_eq!(received, "pingpong");
    }
}
