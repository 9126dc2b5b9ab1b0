//! The shared worker skeleton.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::Shutdown;
use courier_outbox::{Email, EmailStatus, OutboxStore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Rows fetched per polling iteration.
pub const BATCH_SIZE: i64 = 25;

/// The state-transition tuple that specialises a pipe.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    /// Short name used in structured log fields.
    pub pipe: &'static str,
    /// Rows are picked up in this status.
    pub start: EmailStatus,
    /// The claim moves a row here before the action runs.
    pub processing: EmailStatus,
}

/// What a pipe decided for one claimed row.
#[derive(Debug)]
pub enum Disposition {
    /// Transition to `to` (success or failure terminal).
    Advance { to: EmailStatus, reason: String },
    /// The specialised `INTAKING -> READY` transition with the stored
    /// message path.
    Ready { eml_file_path: String },
    /// Throttled: return the row to `READY` for a later iteration.
    Requeue,
}

/// One pipeline variant: its transition tuple plus the action performed
/// per claimed row.
#[async_trait]
pub trait Pipe: Send + Sync + 'static {
    fn transition(&self) -> Transition;

    /// The action. Runs after the claim succeeded; the returned
    /// disposition is recorded on a detached scope so shutdown cannot
    /// abandon a side effect that already happened.
    async fn run(&self, email: &Email) -> Disposition;
}

/// Generic batch processor binding a [`Pipe`] to an outbox store.
#[derive(Clone)]
pub struct Worker {
    store: Arc<dyn OutboxStore>,
    pipe: Arc<dyn Pipe>,
}

impl Worker {
    pub fn new(store: Arc<dyn OutboxStore>, pipe: Arc<dyn Pipe>) -> Self {
        Self { store, pipe }
    }

    #[must_use]
    pub fn pipe_name(&self) -> &'static str {
        self.pipe.transition().pipe
    }

    /// One polling iteration: fetch a batch and process every row
    /// concurrently, returning once all row tasks finished.
    pub async fn process(&self, shutdown: &Shutdown) {
        let transition = self.pipe.transition();

        let batch = match self
            .store
            .query(shutdown, transition.start, BATCH_SIZE)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                error!(
                    pipe = transition.pipe,
                    error = %err,
                    "error while querying emails to process"
                );
                return;
            }
        };

        let mut tasks: JoinSet<()> = JoinSet::new();
        for email in batch {
            let store = Arc::clone(&self.store);
            let pipe = Arc::clone(&self.pipe);
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                process_row(&*store, &*pipe, &shutdown, email).await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}

async fn process_row(store: &dyn OutboxStore, pipe: &dyn Pipe, shutdown: &Shutdown, email: Email) {
    let transition = pipe.transition();
    info!(pipe = transition.pipe, email_id = %email.id, "processing outbox row");

    // The claim carries the row's reason forward so the audit trail of a
    // failed email keeps its diagnostic through the callback states.
    let claim_reason = email.reason.clone().unwrap_or_default();
    if let Err(err) = store
        .update(
            shutdown,
            &email.id,
            transition.processing,
            &claim_reason,
            email.ttl,
        )
        .await
    {
        warn!(
            pipe = transition.pipe,
            email_id = %email.id,
            error = %err,
            "failed to acquire processing lock"
        );
        return;
    }

    let disposition = pipe.run(&email).await;

    // Terminal transitions run detached: the side effect has happened,
    // so the audit advance must not be skipped because of shutdown.
    let detached = Shutdown::detached();
    match disposition {
        Disposition::Ready { eml_file_path } => {
            // INVALID is reserved for payload and render failures. A
            // backend failure on the audit write leaves the row in
            // INTAKING with its stored message intact.
            if let Err(err) = store
                .ready(&detached, &email.id, &eml_file_path, email.ttl)
                .await
            {
                error!(
                    pipe = transition.pipe,
                    email_id = %email.id,
                    error = %err,
                    "failed to update status to READY, row stays in INTAKING"
                );
            }
        }
        Disposition::Requeue => {
            if let Err(err) = store.requeue(&detached, &email.id).await {
                error!(
                    pipe = transition.pipe,
                    email_id = %email.id,
                    error = %err,
                    "failed to requeue row"
                );
            }
        }
        Disposition::Advance { to, reason } => {
            record(store, &detached, transition.pipe, &email, to, &reason).await;
        }
    }
}

async fn record(
    store: &dyn OutboxStore,
    cancel: &Shutdown,
    pipe: &'static str,
    email: &Email,
    to: EmailStatus,
    reason: &str,
) {
    if let Err(err) = store.update(cancel, &email.id, to, reason, email.ttl).await {
        error!(
            pipe,
            email_id = %email.id,
            status = %to,
            error = %err,
            "error updating status after action"
        );
    }
}
