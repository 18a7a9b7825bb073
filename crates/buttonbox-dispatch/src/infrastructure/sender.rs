//! The UDP command sender.
//!
//! [`DatagramSender`] owns a single lazily-bound UDP socket and turns
//! commands into encoded datagrams.  Sends are strictly best-effort:
//! success means the datagram left the local socket, nothing more.  The
//! socket binds on first use so the application can start (and the user can
//! edit settings) with no network available at all.
//!
//! The [`CommandSender`] trait is the seam the dispatcher depends on, so
//! dispatch behaviour is testable with recording doubles and no sockets.

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info};

use buttonbox_core::domain::endpoint::Endpoint;
use buttonbox_core::protocol::codec::{encode_message_now, ProtocolError};
use buttonbox_core::protocol::messages::{Command, WireMessage};
use buttonbox_core::protocol::sequence::SequenceCounter;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error type for a single send attempt.
#[derive(Debug, Error)]
pub enum SendError {
    /// The command could not be encoded.
    #[error("failed to encode command: {0}")]
    Encode(#[from] ProtocolError),

    /// Binding the local socket failed.
    #[error("failed to bind local UDP socket: {0}")]
    Bind(#[source] io::Error),

    /// The OS rejected the send (unresolvable host, unreachable network,
    /// address family mismatch).  The datagram for this command is gone;
    /// later sends may still succeed.
    #[error("failed to send datagram: {0}")]
    Transport(#[source] io::Error),
}

/// What a successful send tells the caller: where the datagram went and how
/// big it was.  Deliberately nothing about delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub endpoint: Endpoint,
    pub bytes: usize,
}

// ── Sender trait ──────────────────────────────────────────────────────────────

/// Transmits one command to one endpoint, best-effort.
#[async_trait]
pub trait CommandSender: Send + Sync {
    /// Encodes and transmits `command` to `endpoint`.
    async fn send(&self, command: &Command, endpoint: &Endpoint) -> Result<SendReceipt, SendError>;

    /// Releases the underlying socket, if open.  Idempotent; a later `send`
    /// transparently re-acquires one.
    async fn close(&self);
}

// ── UDP implementation ────────────────────────────────────────────────────────

/// [`CommandSender`] over a real UDP socket.
pub struct DatagramSender {
    socket: Mutex<Option<UdpSocket>>,
    sequence: SequenceCounter,
}

impl DatagramSender {
    pub fn new() -> Self {
        Self {
            socket: Mutex::new(None),
            sequence: SequenceCounter::new(),
        }
    }

    /// Whether a socket is currently bound.  Used by tests to assert that
    /// failed resolutions never touch the network.
    pub async fn is_open(&self) -> bool {
        self.socket.lock().await.is_some()
    }
}

impl Default for DatagramSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSender for DatagramSender {
    async fn send(&self, command: &Command, endpoint: &Endpoint) -> Result<SendReceipt, SendError> {
        let message = WireMessage::from(command.clone());
        let datagram = encode_message_now(&message, self.sequence.next())?;

        let mut guard = self.socket.lock().await;
        let socket = match guard.take() {
            Some(socket) => socket,
            None => {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .await
                    .map_err(SendError::Bind)?;
                debug!(local = ?socket.local_addr().ok(), "bound UDP send socket");
                socket
            }
        };

        let result = socket
            .send_to(&datagram, (endpoint.host(), endpoint.port()))
            .await;
        // Keep the socket across transport failures; only `close` drops it.
        *guard = Some(socket);
        let bytes = result.map_err(SendError::Transport)?;

        debug!(
            kind = command.kind(),
            target = %endpoint,
            bytes,
            "datagram sent"
        );
        Ok(SendReceipt {
            endpoint: endpoint.clone(),
            bytes,
        })
    }

    async fn close(&self) {
        if self.socket.lock().await.take().is_some() {
            info!("UDP send socket closed");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
