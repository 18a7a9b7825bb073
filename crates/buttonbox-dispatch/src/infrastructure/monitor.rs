//! Background connection monitor.
//!
//! Sends `Ping` probes to the configured target and watches for the matching
//! `Pong`, publishing a [`LinkStatus`] plus a rolling latency average on
//! `watch` channels for the UI.  The monitor is purely advisory: command
//! dispatch neither waits for it nor consults it, so a wrong verdict can
//! never block input.
//!
//! The status rules live in [`LinkHealth`], a synchronous state machine kept
//! free of sockets and timers so the hysteresis is unit-testable.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use buttonbox_core::domain::endpoint::Endpoint;
use buttonbox_core::protocol::codec::{decode_message, encode_message_now};
use buttonbox_core::protocol::messages::WireMessage;
use buttonbox_core::protocol::sequence::SequenceCounter;

use crate::infrastructure::settings::{EndpointResolver, MonitorConfig};

/// Consecutive pongs needed before the link is reported up.
const MIN_SUCCESSES_FOR_UP: u32 = 2;

/// Consecutive missed pongs before the link is reported down.
const MAX_FAILURES_FOR_DOWN: u32 = 3;

/// Rolling window used for the latency average.
const LATENCY_WINDOW: usize = 5;

// ── Link status ───────────────────────────────────────────────────────────────

/// Advisory link verdict shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No target endpoint is configured.
    NoTarget,
    /// A target exists but no verdict has been reached yet.
    Probing,
    /// Recent probes are being answered.
    Up,
    /// Probes have gone unanswered long enough to call the link lost.
    Down,
}

// ── Health state machine ──────────────────────────────────────────────────────

/// Hysteresis over probe results.
///
/// Single missed pongs are absorbed (UDP loses packets on a healthy LAN
/// too); only streaks move the verdict, in either direction.
#[derive(Debug)]
pub struct LinkHealth {
    status: LinkStatus,
    consecutive_ok: u32,
    consecutive_failed: u32,
    latencies: VecDeque<u64>,
}

impl LinkHealth {
    pub fn new() -> Self {
        Self {
            status: LinkStatus::Probing,
            consecutive_ok: 0,
            consecutive_failed: 0,
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Records an answered probe and returns the (possibly updated) status.
    pub fn record_success(&mut self, latency_ms: u64) -> LinkStatus {
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);

        self.consecutive_failed = 0;
        self.consecutive_ok += 1;
        if self.consecutive_ok >= MIN_SUCCESSES_FOR_UP {
            self.status = LinkStatus::Up;
        }
        self.status
    }

    /// Records a missed probe and returns the (possibly updated) status.
    pub fn record_failure(&mut self) -> LinkStatus {
        self.consecutive_ok = 0;
        self.consecutive_failed += 1;
        if self.consecutive_failed >= MAX_FAILURES_FOR_DOWN {
            self.status = LinkStatus::Down;
        }
        self.status
    }

    /// Mean of the most recent answered-probe latencies.
    pub fn average_latency_ms(&self) -> Option<u64> {
        if self.latencies.is_empty() {
            return None;
        }
        let sum: u64 = self.latencies.iter().sum();
        Some(sum / self.latencies.len() as u64)
    }

    /// Forgets all history, e.g. after the target endpoint changed.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tuning ────────────────────────────────────────────────────────────────────

/// Probe cadence, decoupled from the serialized config so tests can run on
/// millisecond timers.
#[derive(Debug, Clone)]
pub struct MonitorTuning {
    /// Interval between probes while the link is up.
    pub ping_interval: Duration,
    /// Interval between probes while probing or down.
    pub probe_interval: Duration,
    /// How long to wait for a pong.
    pub pong_timeout: Duration,
}

impl Default for MonitorTuning {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for MonitorTuning {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            ping_interval: Duration::from_millis(config.ping_interval_ms),
            probe_interval: Duration::from_millis(config.probe_interval_ms),
            pong_timeout: Duration::from_millis(config.pong_timeout_ms),
        }
    }
}

// ── Monitor ───────────────────────────────────────────────────────────────────

/// Handle on a running monitor task.
pub struct MonitorHandle {
    status_rx: watch::Receiver<LinkStatus>,
    latency_rx: watch::Receiver<Option<u64>>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Latest link verdict.
    pub fn status(&self) -> LinkStatus {
        *self.status_rx.borrow()
    }

    /// Latest rolling latency average, if any probe has been answered.
    pub fn latency_ms(&self) -> Option<u64> {
        *self.latency_rx.borrow()
    }

    /// A receiver for reacting to status transitions.
    pub fn status_receiver(&self) -> watch::Receiver<LinkStatus> {
        self.status_rx.clone()
    }

    /// Asks the monitor loop to stop after its current probe.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits for the monitor task to finish.
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

/// Spawns the probe loop on its own ephemeral UDP socket.
pub struct ConnectionMonitor;

impl ConnectionMonitor {
    pub fn spawn(resolver: EndpointResolver, tuning: MonitorTuning) -> MonitorHandle {
        let initial = if resolver.current().is_some() {
            LinkStatus::Probing
        } else {
            LinkStatus::NoTarget
        };
        let (status_tx, status_rx) = watch::channel(initial);
        let (latency_tx, latency_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_monitor(
            resolver,
            tuning,
            status_tx,
            latency_tx,
            shutdown_rx,
        ));

        MonitorHandle {
            status_rx,
            latency_rx,
            shutdown_tx,
            task,
        }
    }
}

async fn run_monitor(
    resolver: EndpointResolver,
    tuning: MonitorTuning,
    status_tx: watch::Sender<LinkStatus>,
    latency_tx: watch::Sender<Option<u64>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut health = LinkHealth::new();
    let mut socket: Option<UdpSocket> = None;
    let mut last_target: Option<Option<Endpoint>> = None;
    let sequence = SequenceCounter::new();

    info!("connection monitor started");
    loop {
        let target = resolver.current();

        // Target edits reset all history so a stale verdict about the old
        // machine is never shown for the new one.
        if last_target.as_ref() != Some(&target) {
            health.reset();
            // Clear latency before the status flips so an observer woken by
            // the transition never sees the old target's numbers.
            latency_tx.send_replace(None);
            publish_status(
                &status_tx,
                if target.is_some() {
                    LinkStatus::Probing
                } else {
                    LinkStatus::NoTarget
                },
            );
            last_target = Some(target.clone());
        }

        // No target means no socket: holding one while idle would pin a
        // descriptor the whole app lifetime for nothing.
        if target.is_none() {
            socket = None;
        }

        if let Some(endpoint) = &target {
            if socket.is_none() {
                match UdpSocket::bind("0.0.0.0:0").await {
                    Ok(bound) => socket = Some(bound),
                    Err(err) => warn!(error = %err, "monitor socket bind failed, will retry"),
                }
            }
            if let Some(sock) = &socket {
                match probe_once(sock, endpoint, &sequence, tuning.pong_timeout).await {
                    Some(latency_ms) => {
                        let status = health.record_success(latency_ms);
                        publish_status(&status_tx, status);
                        latency_tx.send_replace(health.average_latency_ms());
                    }
                    None => {
                        let status = health.record_failure();
                        publish_status(&status_tx, status);
                    }
                }
            }
        }

        let pause = if health.status() == LinkStatus::Up {
            tuning.ping_interval
        } else {
            tuning.probe_interval
        };
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!("connection monitor stopped");
}

fn publish_status(status_tx: &watch::Sender<LinkStatus>, status: LinkStatus) {
    let transitioned = status_tx.send_if_modified(|current| {
        if *current == status {
            false
        } else {
            *current = status;
            true
        }
    });
    if transitioned {
        info!(?status, "link status changed");
    }
}

/// One ping/pong exchange.  Returns the round-trip latency, or `None` for
/// any failure (send error, timeout, undecodable reply).  Unrelated or stale
/// datagrams arriving on the socket are skipped, not counted as failures.
async fn probe_once(
    socket: &UdpSocket,
    endpoint: &Endpoint,
    sequence: &SequenceCounter,
    pong_timeout: Duration,
) -> Option<u64> {
    let token = sequence.next();
    let ping = match encode_message_now(&WireMessage::Ping(token), token) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to encode ping");
            return None;
        }
    };
    if let Err(err) = socket
        .send_to(&ping, (endpoint.host(), endpoint.port()))
        .await
    {
        debug!(error = %err, target = %endpoint, "ping send failed");
        return None;
    }

    let sent_at = Instant::now();
    let mut buf = [0u8; 256];
    loop {
        let remaining = pong_timeout.checked_sub(sent_at.elapsed())?;
        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Err(_elapsed) => return None,
            Ok(Err(err)) => {
                debug!(error = %err, "pong receive failed");
                return None;
            }
            Ok(Ok((len, _from))) => {
                if let Ok((WireMessage::Pong(echoed), _)) = decode_message(&buf[..len]) {
                    if echoed == token {
                        return Some(sent_at.elapsed().as_millis() as u64);
                    }
                    debug!(echoed, expected = token, "stale pong token, still waiting");
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
