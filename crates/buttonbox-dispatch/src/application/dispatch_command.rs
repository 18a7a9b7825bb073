//! The command dispatch use case.
//!
//! [`Dispatcher::dispatch`] is the single entry point the UI layer calls
//! when a button fires.  It never blocks and never returns an error: the
//! command is queued, and whatever happens to it afterwards is reported on
//! the [`DispatchOutcome`] channel for logging or a status indicator.
//!
//! A single worker task drains the queue serially, which keeps local send
//! order identical to dispatch order.  The target endpoint is resolved per
//! command at send time, so a settings edit takes effect on the very next
//! dispatched command without any restart or reconnect step.

use std::sync::Arc;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use buttonbox_core::protocol::messages::Command;

use crate::infrastructure::sender::{CommandSender, SendError, SendReceipt};
use crate::infrastructure::settings::EndpointResolver;

/// Commands queued but not yet sent.  Sized for burst tapping; a full queue
/// means the network is stalled badly enough that dropping is kinder than
/// buffering stale inputs.
const QUEUE_DEPTH: usize = 64;

/// Outcomes buffered for the observer.  Outcomes are advisory; if nobody is
/// draining them they are dropped, never the commands themselves.
const OUTCOME_DEPTH: usize = 64;

// ── Errors and outcomes ───────────────────────────────────────────────────────

/// Why a dispatched command did not make it onto the wire.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No valid target endpoint is configured.
    #[error("no target endpoint configured")]
    UnresolvedEndpoint,

    /// The send itself failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The queue was full; the command was dropped.
    #[error("dispatch queue full, command dropped")]
    QueueFull,

    /// The dispatcher has been shut down.
    #[error("dispatcher is shut down")]
    Closed,
}

/// Per-command report delivered on the outcome channel.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Stable label of the command kind (`"key_event"`, `"axis"`, ...).
    pub command_kind: &'static str,
    pub result: Result<SendReceipt, DispatchError>,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Queues commands and sends them in order via the configured sender.
pub struct Dispatcher {
    job_tx: Mutex<Option<mpsc::Sender<Command>>>,
    outcome_tx: mpsc::Sender<DispatchOutcome>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawns the worker task and returns the dispatcher plus the outcome
    /// receiver.  The caller decides whether to drain outcomes; ignoring
    /// them costs nothing.
    pub fn new(
        resolver: EndpointResolver,
        sender: Arc<dyn CommandSender>,
    ) -> (Self, mpsc::Receiver<DispatchOutcome>) {
        let (job_tx, job_rx) = mpsc::channel::<Command>(QUEUE_DEPTH);
        let (outcome_tx, outcome_rx) = mpsc::channel::<DispatchOutcome>(OUTCOME_DEPTH);

        let worker = tokio::spawn(run_worker(job_rx, resolver, sender, outcome_tx.clone()));

        (
            Self {
                job_tx: Mutex::new(Some(job_tx)),
                outcome_tx,
                worker: Mutex::new(Some(worker)),
            },
            outcome_rx,
        )
    }

    /// Queues one command for sending.  Never blocks; failures surface only
    /// as outcomes.
    pub fn dispatch(&self, command: Command) {
        let kind = command.kind();
        let guard = match self.job_tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(job_tx) = guard.as_ref() else {
            warn!(kind, "dispatch after shutdown, command dropped");
            self.report(kind, Err(DispatchError::Closed));
            return;
        };
        match job_tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind, "dispatch queue full, command dropped");
                self.report(kind, Err(DispatchError::QueueFull));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(kind, "dispatch worker gone, command dropped");
                self.report(kind, Err(DispatchError::Closed));
            }
        }
    }

    /// Stops accepting commands and lets the worker drain what is already
    /// queued, then close the sender's socket.
    ///
    /// The first call returns the worker handle so a caller that wants a
    /// clean exit can await it; repeat calls are no-ops returning `None`.
    pub fn shutdown(&self) -> Option<JoinHandle<()>> {
        let mut guard = match self.job_tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.take().is_none() {
            return None;
        }
        info!("dispatcher shutting down");
        let mut worker = match self.worker.lock() {
            Ok(worker) => worker,
            Err(poisoned) => poisoned.into_inner(),
        };
        worker.take()
    }

    fn report(&self, command_kind: &'static str, result: Result<SendReceipt, DispatchError>) {
        // Best effort; a full or unobserved outcome channel is fine.
        let _ = self.outcome_tx.try_send(DispatchOutcome {
            command_kind,
            result,
        });
    }
}

/// Worker loop: resolve the endpoint at send time, send, report.  Exits once
/// every queue sender is dropped, then releases the socket.
async fn run_worker(
    mut job_rx: mpsc::Receiver<Command>,
    resolver: EndpointResolver,
    sender: Arc<dyn CommandSender>,
    outcome_tx: mpsc::Sender<DispatchOutcome>,
) {
    while let Some(command) = job_rx.recv().await {
        let kind = command.kind();
        let result = match resolver.current() {
            None => {
                debug!(kind, "no target endpoint, command not sent");
                Err(DispatchError::UnresolvedEndpoint)
            }
            Some(endpoint) => match sender.send(&command, &endpoint).await {
                Ok(receipt) => {
                    debug!(kind, target = %receipt.endpoint, bytes = receipt.bytes, "command sent");
                    Ok(receipt)
                }
                Err(err) => {
                    warn!(kind, error = %err, "command send failed");
                    Err(DispatchError::Send(err))
                }
            },
        };
        let _ = outcome_tx.try_send(DispatchOutcome {
            command_kind: kind,
            result,
        });
    }
    sender.close().await;
    info!("dispatch worker stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
