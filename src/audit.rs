//! Fire-and-forget audit recording.
//!
//! [`AuditRecorder::record`] never waits on the store. A background task
//! writes entries in order; entries the store refuses are parked in a bounded
//! local queue and retried, oldest first, before every later write and on
//! [`AuditRecorder::flush`].

use crate::constants::MAX_AUDIT_FALLBACK;
use crate::store::AuditLog;
use crate::types::AuditEntry;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum Command {
    Record(AuditEntry),
    Flush(oneshot::Sender<usize>),
}

type Fallback = Arc<Mutex<VecDeque<AuditEntry>>>;

pub struct AuditRecorder {
    commands: mpsc::UnboundedSender<Command>,
    fallback: Fallback,
    worker: JoinHandle<()>,
}

impl AuditRecorder {
    /// Start the writer task on the current tokio runtime
    pub fn spawn<L>(log: Arc<L>) -> Self
    where
        L: AuditLog + ?Sized + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let fallback: Fallback = Arc::new(Mutex::new(VecDeque::new()));
        let worker = tokio::spawn(run_worker(log, rx, Arc::clone(&fallback)));
        Self {
            commands,
            fallback,
            worker,
        }
    }

    /// Queue `entry` for durable storage and return immediately
    pub fn record(&self, entry: AuditEntry) {
        tracing::debug!(action = %entry.action, model = %entry.model_id, "audit entry queued");
        if let Err(mpsc::error::SendError(Command::Record(entry))) =
            self.commands.send(Command::Record(entry))
        {
            tracing::warn!("audit writer stopped, keeping entry locally");
            park(&self.fallback, entry);
        }
    }

    /// Entries currently held in the local fallback queue
    pub fn pending(&self) -> Vec<AuditEntry> {
        lock(&self.fallback).iter().cloned().collect()
    }

    /// Wait until everything recorded so far has been attempted, retrying the
    /// fallback queue. Returns the number of entries still undelivered.
    pub async fn flush(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_err() {
            return lock(&self.fallback).len();
        }
        match rx.await {
            Ok(remaining) => remaining,
            Err(_) => lock(&self.fallback).len(),
        }
    }

    /// Flush and stop the writer. Returns the entries that could not be stored.
    pub async fn shutdown(self) -> Vec<AuditEntry> {
        self.flush().await;
        drop(self.commands);
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "audit writer ended abnormally");
        }
        lock(&self.fallback).drain(..).collect()
    }
}

fn lock(fallback: &Fallback) -> MutexGuard<'_, VecDeque<AuditEntry>> {
    fallback.lock().unwrap_or_else(PoisonError::into_inner)
}

fn park(fallback: &Fallback, entry: AuditEntry) {
    let mut queue = lock(fallback);
    if queue.len() >= MAX_AUDIT_FALLBACK
        && let Some(dropped) = queue.pop_front()
    {
        tracing::warn!(
            action = %dropped.action,
            created_at = %dropped.created_at,
            "audit fallback queue full, dropping oldest entry"
        );
    }
    queue.push_back(entry);
}

async fn run_worker<L>(
    log: Arc<L>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    fallback: Fallback,
) where
    L: AuditLog + ?Sized,
{
    while let Some(command) = commands.recv().await {
        match command {
            Command::Record(entry) => {
                if !retry_parked(log.as_ref(), &fallback).await {
                    // Store still down; keep order behind the parked entries
                    park(&fallback, entry);
                    continue;
                }
                if let Err(e) = log.append_audit(entry.clone()).await {
                    tracing::warn!(error = %e, action = %entry.action, "audit write failed, parking entry");
                    park(&fallback, entry);
                }
            }
            Command::Flush(reply) => {
                retry_parked(log.as_ref(), &fallback).await;
                let _ = reply.send(lock(&fallback).len());
            }
        }
    }
}

/// Drain the fallback queue in order. Returns `true` once it is empty.
async fn retry_parked<L>(log: &L, fallback: &Fallback) -> bool
where
    L: AuditLog + ?Sized,
{
    loop {
        let Some(entry) = lock(fallback).pop_front() else {
            return true;
        };
        if let Err(e) = log.append_audit(entry.clone()).await {
            tracing::debug!(error = %e, "audit store still unavailable");
            lock(fallback).push_front(entry);
            return false;
        }
    }
}
