//! Background rebuild worker.
//!
//! Requests are queued over an mpsc channel. Requests that arrive within the
//! debounce window of each other are served by a single pass, and each one
//! gets a ticket that resolves with that pass's outcome. A batch never waits
//! longer than `MAX_BATCH_WINDOWS` debounce windows after its first request.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{IndexRebuilder, RebuildReport};
use crate::error::{Result, RagagentError};

type PassOutcome = std::result::Result<RebuildReport, String>;

const MAX_BATCH_WINDOWS: u32 = 4;

struct RebuildRequest {
    reason: String,
    reply: oneshot::Sender<PassOutcome>,
}

/// Latest state of the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildStatus {
    Idle,
    Running,
    Succeeded(RebuildReport),
    Failed(String),
}

/// Resolves once the pass serving its request has finished
pub struct RebuildTicket {
    rx: oneshot::Receiver<PassOutcome>,
}

impl RebuildTicket {
    pub async fn wait(self) -> Result<RebuildReport> {
        match self.rx.await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(message)) => Err(RagagentError::RebuildFailed(message)),
            Err(_) => Err(RagagentError::RebuildFailed("rebuild worker stopped".to_string())),
        }
    }
}

/// Cheap, cloneable handle for queueing rebuilds
#[derive(Clone)]
pub struct RebuildHandle {
    tx: mpsc::UnboundedSender<RebuildRequest>,
    status: watch::Receiver<RebuildStatus>,
}

impl RebuildHandle {
    /// Queue a rebuild and return immediately.
    ///
    /// Dropping the ticket does not cancel the pass.
    pub fn request(&self, reason: impl Into<String>) -> RebuildTicket {
        let (reply, rx) = oneshot::channel();
        let request = RebuildRequest {
            reason: reason.into(),
            reply,
        };
        if let Err(e) = self.tx.send(request) {
            log::warn!("Rebuild worker is gone, dropping request: {}", e.0.reason);
        }
        RebuildTicket { rx }
    }

    pub fn status(&self) -> RebuildStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RebuildStatus> {
        self.status.clone()
    }
}

pub struct RebuildWorker;

impl RebuildWorker {
    /// Spawn the worker task. It exits when `cancel` fires or every handle is dropped.
    pub fn spawn(
        rebuilder: Arc<IndexRebuilder>,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> (RebuildHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RebuildStatus::Idle);
        let task = tokio::spawn(run(rebuilder, debounce, cancel, rx, status_tx));
        (
            RebuildHandle {
                tx,
                status: status_rx,
            },
            task,
        )
    }
}

async fn run(
    rebuilder: Arc<IndexRebuilder>,
    debounce: Duration,
    cancel: CancellationToken,
    mut rx: mpsc::UnboundedReceiver<RebuildRequest>,
    status: watch::Sender<RebuildStatus>,
) {
    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let mut batch = vec![first];
        let deadline = Instant::now() + debounce * MAX_BATCH_WINDOWS;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(debounce.min(remaining), rx.recv()).await {
                Ok(Some(request)) => batch.push(request),
                _ => break,
            }
        }

        let reasons: Vec<&str> = batch.iter().map(|r| r.reason.as_str()).collect();
        log::info!("Rebuild requested ({})", reasons.join(", "));

        status.send_replace(RebuildStatus::Running);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err("rebuild cancelled".to_string()),
            result = rebuilder.rebuild() => result.map_err(|e| e.to_string()),
        };

        match &outcome {
            Ok(report) => {
                status.send_replace(RebuildStatus::Succeeded(report.clone()));
            }
            Err(message) => {
                log::error!("Rebuild failed, keeping previous index: {}", message);
                status.send_replace(RebuildStatus::Failed(message.clone()));
            }
        }

        for request in batch {
            let _ = request.reply.send(outcome.clone());
        }

        if cancel.is_cancelled() {
            break;
        }
    }
    log::debug!("Rebuild worker stopped");
}
