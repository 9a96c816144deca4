//! Connection transport
//!
//! One [`Connection`] owns the read side of one socket, its receive buffer
//! and its [`MessageAccumulator`]. The write side is split off at
//! construction and handed to the send path, so reading and writing never
//! contend on a lock. A connection performs at most one outstanding read at
//! a time; its owning task awaits each message in turn.

use crate::error::NetworkError;
use crate::network::{FramingMode, MessageAccumulator, READ_BUFFER_SIZE};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// The receiving half of one live socket.
///
/// Dropping the `Connection` together with the write half closes the
/// socket; a peer blocked in a read then completes with zero bytes and
/// tears itself down. That is the only cancellation mechanism — nothing
/// interrupts an in-progress write.
#[derive(Debug)]
pub struct Connection {
    read: OwnedReadHalf,
    buffer: Box<[u8]>,
    accumulator: MessageAccumulator,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Wrap an accepted or connected stream, splitting off its write half.
    ///
    /// The returned write half is meant to be owned by a
    /// [`SendQueue`](crate::network::SendQueue) writer task.
    pub fn from_stream(
        stream: TcpStream,
        framing: FramingMode,
    ) -> Result<(Self, OwnedWriteHalf), NetworkError> {
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| NetworkError::ConnectionFailed {
                address: "peer".to_string(),
                reason: format!("Failed to get peer address: {}", e),
            })?;

        let (read, write) = stream.into_split();

        let connection = Self {
            read,
            buffer: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            accumulator: MessageAccumulator::new(framing),
            peer_addr,
        };

        Ok((connection, write))
    }

    /// Open a TCP connection to `address` (client side)
    pub async fn connect(
        address: SocketAddr,
        framing: FramingMode,
    ) -> Result<(Self, OwnedWriteHalf), NetworkError> {
        let stream =
            TcpStream::connect(address)
                .await
                .map_err(|e| NetworkError::ConnectionFailed {
                    address: address.to_string(),
                    reason: format!("TCP connection failed: {}", e),
                })?;

        Self::from_stream(stream, framing)
    }

    /// Receive the next complete message.
    ///
    /// Awaits one read, then drains whatever the kernel already buffered
    /// without suspending; when the drain finds the socket quiet, the
    /// accumulated bytes are declared one message (availability framing) or
    /// the loop re-arms (delimiter framing, terminator still outstanding).
    ///
    /// A zero-byte read means the peer closed the stream; that and any I/O
    /// error are terminal — the caller must treat the connection as dead,
    /// close it, and release its id from any registry.
    pub async fn read_message(&mut self) -> Result<String, NetworkError> {
        loop {
            // A previous read may have delivered more than one delimited
            // message; drain those before touching the socket again.
            if let Some(message) = self.accumulator.pending() {
                return Ok(message);
            }

            let bytes =
                self.read
                    .read(&mut self.buffer)
                    .await
                    .map_err(|e| NetworkError::ReceiveFailed {
                        reason: e.to_string(),
                    })?;
            if bytes == 0 {
                return Err(NetworkError::ConnectionReset);
            }

            if let Some(message) = self.accumulator.feed(&self.buffer[..bytes], true)? {
                return Ok(message);
            }

            if let Some(message) = self.drain_available()? {
                return Ok(message);
            }
        }
    }

    /// Consume bytes that are immediately readable, without suspending.
    ///
    /// Returns a completed message if the availability boundary (socket
    /// momentarily quiet) or a delimiter was reached.
    fn drain_available(&mut self) -> Result<Option<String>, NetworkError> {
        loop {
            match self.read.try_read(&mut self.buffer) {
                Ok(0) => return Err(NetworkError::ConnectionReset),
                Ok(bytes) => {
                    if let Some(message) = self.accumulator.feed(&self.buffer[..bytes], true)? {
                        return Ok(Some(message));
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    // Nothing more immediately available: this is the
                    // message boundary under availability framing.
                    return self.accumulator.feed(&[], false);
                }
                Err(e) => {
                    return Err(NetworkError::ReceiveFailed {
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Remote address of this connection
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_read_single_message() {
        let (client, server) = connected_pair().await;
        let (mut conn, _write) =
            Connection::from_stream(server, FramingMode::Availability).unwrap();

        let mut client = client;
        client.write_all(b"hello").await.unwrap();
        client.flush().await.unwrap();

        let message = conn.read_message().await.unwrap();
        assert_eq!(message, "hello");
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_reset() {
        let (client, server) = connected_pair().await;
        let (mut conn, _write) =
            Connection::from_stream(server, FramingMode::Availability).unwrap();

        drop(client);

        let result = conn.read_message().await;
        assert!(matches!(result, Err(NetworkError::ConnectionReset)));
    }

    #[tokio::test]
    async fn test_sequential_messages_preserve_order() {
        let (client, server) = connected_pair().await;
        let (mut conn, _write) =
            Connection::from_stream(server, FramingMode::Availability).unwrap();

        let mut client = client;
        client.write_all(b"first").await.unwrap();
        let first = conn.read_message().await.unwrap();
        client.write_all(b"second").await.unwrap();
        let second = conn.read_message().await.unwrap();

        assert_eq!(first, "first");
        assert_eq!(second, "second");
    }

    #[tokio::test]
    async fn test_line_delimited_reads() {
        let (client, server) = connected_pair().await;
        let (mut conn, _write) =
            Connection::from_stream(server, FramingMode::LineDelimited).unwrap();

        let mut client = client;
        client.write_all(b"one\ntwo\n").await.unwrap();

        assert_eq!(conn.read_message().await.unwrap(), "one");
        assert_eq!(conn.read_message().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_connection_failed() {
        // Bind and immediately drop to get an address nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Connection::connect(addr, FramingMode::Availability).await;
        assert!(matches!(
            result,
            Err(NetworkError::ConnectionFailed { .. })
        ));
    }
}
