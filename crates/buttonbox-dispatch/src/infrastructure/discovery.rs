//! LAN peer discovery.
//!
//! A paired machine runs a small receiver that answers `Discover` broadcasts
//! with an `Announce` carrying its name and command port.  [`sweep`] sends
//! one broadcast probe and collects every answer that arrives within the
//! window, so the CLI can offer discovered peers instead of making the user
//! type an IP address.
//!
//! Discovery is strictly optional: the settings store can always be fed a
//! manual `{host, port}`, and a sweep that finds nothing changes no state.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

use tracing::{debug, info, warn};

use buttonbox_core::domain::endpoint::Endpoint;
use buttonbox_core::protocol::codec::{decode_message, encode_message_now, ProtocolError};
use buttonbox_core::protocol::messages::WireMessage;
use buttonbox_core::protocol::sequence::SequenceCounter;

/// Probe destination for a whole-LAN sweep.  Tests aim at loopback instead.
pub const BROADCAST_HOST: &str = "255.255.255.255";

/// Error type for a discovery sweep.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The probe socket could not be bound or configured.
    #[error("failed to bind discovery socket: {0}")]
    Bind(#[source] io::Error),

    /// Sending the broadcast probe failed.
    #[error("failed to send discovery probe: {0}")]
    Probe(#[source] io::Error),

    /// The probe message could not be encoded.
    #[error("failed to encode discovery probe: {0}")]
    Encode(#[from] ProtocolError),
}

/// One machine that answered a discovery probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    /// The name the peer advertised.
    pub name: String,
    /// Where its command receiver listens: announce source IP plus the
    /// announced command port.
    pub endpoint: Endpoint,
}

/// Sends one `Discover` probe to `probe_host:discovery_port` and collects
/// `Announce` replies until `window` elapses.
///
/// Replies that are not announces, fail to decode, or announce an invalid
/// port are skipped.  Duplicate announces from the same endpoint are
/// collapsed.  An empty result is not an error; it just means nobody
/// answered.
pub async fn sweep(
    probe_host: &str,
    discovery_port: u16,
    window: Duration,
) -> Result<Vec<DiscoveredPeer>, DiscoveryError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(DiscoveryError::Bind)?;
    socket.set_broadcast(true).map_err(DiscoveryError::Bind)?;

    let sequence = SequenceCounter::new();
    let probe = encode_message_now(&WireMessage::Discover(sequence.next()), sequence.current())?;
    socket
        .send_to(&probe, (probe_host, discovery_port))
        .await
        .map_err(DiscoveryError::Probe)?;
    debug!(probe_host, discovery_port, "discovery probe sent");

    let deadline = Instant::now() + window;
    let mut peers: Vec<DiscoveredPeer> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let (len, from) = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Err(_elapsed) => break,
            Ok(Err(err)) => {
                debug!(error = %err, "discovery receive failed");
                break;
            }
            Ok(Ok(pair)) => pair,
        };
        match decode_message(&buf[..len]) {
            Ok((WireMessage::Announce { name, command_port }, _)) => {
                let endpoint = match Endpoint::new(from.ip().to_string(), command_port) {
                    Ok(endpoint) => endpoint,
                    Err(err) => {
                        warn!(%from, command_port, error = %err, "ignoring invalid announce");
                        continue;
                    }
                };
                if peers.iter().any(|peer| peer.endpoint == endpoint) {
                    continue;
                }
                info!(name, %endpoint, "peer announced");
                peers.push(DiscoveredPeer { name, endpoint });
            }
            Ok((other, _)) => {
                debug!(kind = ?other.message_type(), %from, "unexpected message during discovery");
            }
            Err(err) => {
                debug!(error = %err, %from, "undecodable discovery reply");
            }
        }
    }
    Ok(peers)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::task::JoinHandle;

    const WINDOW: Duration = Duration::from_millis(300);

    /// A fake receiver answering every `Discover` with the given announce.
    async fn spawn_announcer(name: &'static str, command_port: u16) -> (u16, JoinHandle<()>) {
        spawn_responder(move |_| {
            Some(WireMessage::Announce {
                name: name.to_string(),
                command_port,
            })
        })
        .await
    }

    /// A fake receiver answering every `Discover` with whatever `reply`
    /// produces (or staying silent on `None`).
    async fn spawn_responder<F>(reply: F) -> (u16, JoinHandle<()>)
    where
        F: Fn(u64) -> Option<WireMessage> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                if let Ok((WireMessage::Discover(token), _)) = decode_message(&buf[..len]) {
                    if let Some(message) = reply(token) {
                        let bytes = encode_message_now(&message, 0).unwrap();
                        let _ = socket.send_to(&bytes, from).await;
                    }
                }
            }
        });
        (port, task)
    }

    #[tokio::test]
    async fn test_sweep_collects_announcing_peer() {
        // Arrange
        let (port, responder) = spawn_announcer("GamePC", 5055).await;

        // Act
        let peers = sweep("127.0.0.1", port, WINDOW).await.expect("sweep");

        // Assert
        assert_eq!(
            peers,
            vec![DiscoveredPeer {
                name: "GamePC".to_string(),
                endpoint: Endpoint::new("127.0.0.1", 5055).unwrap(),
            }]
        );
        responder.abort();
    }

    #[tokio::test]
    async fn test_sweep_is_empty_when_nobody_answers() {
        // A bound but silent socket.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let peers = sweep("127.0.0.1", port, WINDOW).await.expect("sweep");

        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_skips_non_announce_replies() {
        let (port, responder) = spawn_responder(|token| Some(WireMessage::Pong(token))).await;

        let peers = sweep("127.0.0.1", port, WINDOW).await.expect("sweep");

        assert!(peers.is_empty());
        responder.abort();
    }

    #[tokio::test]
    async fn test_sweep_skips_announce_with_invalid_port() {
        let (port, responder) = spawn_announcer("BadPC", 0).await;

        let peers = sweep("127.0.0.1", port, WINDOW).await.expect("sweep");

        assert!(peers.is_empty());
        responder.abort();
    }

    #[tokio::test]
    async fn test_sweep_collapses_duplicate_announces() {
        // A responder that answers each probe twice.
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                if let Ok((WireMessage::Discover(_), _)) = decode_message(&buf[..len]) {
                    let announce = WireMessage::Announce {
                        name: "GamePC".to_string(),
                        command_port: 5055,
                    };
                    let bytes = encode_message_now(&announce, 0).unwrap();
                    let _ = socket.send_to(&bytes, from).await;
                    let _ = socket.send_to(&bytes, from).await;
                }
            }
        });

        let peers = sweep("127.0.0.1", port, WINDOW).await.expect("sweep");

        assert_eq!(peers.len(), 1);
        responder.abort();
    }
}
