//! Fixed-interval driver for the pipeline workers.

use std::time::Duration;

use courier_common::Shutdown;
use tokio::task::JoinSet;
use tracing::info;

use crate::worker::Worker;

/// Runs every worker in its own task at a fixed interval until the
/// shutdown scope fires, then joins them all. Each worker performs an
/// immediate first pass so a restart drains backlog without waiting one
/// interval.
pub struct Scheduler {
    workers: Vec<Worker>,
    interval: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new(interval_secs: u64) -> Self {
        Self {
            workers: Vec::new(),
            interval: Duration::from_secs(interval_secs),
        }
    }

    #[must_use]
    pub fn with_worker(mut self, worker: Worker) -> Self {
        self.workers.push(worker);
        self
    }

    /// Drive all workers until shutdown; returns once every in-flight
    /// iteration has completed.
    pub async fn run(self, shutdown: Shutdown) {
        let mut tasks: JoinSet<()> = JoinSet::new();

        for worker in self.workers {
            let shutdown = shutdown.clone();
            let interval = self.interval;
            tasks.spawn(async move {
                run_worker(worker, interval, shutdown).await;
            });
        }

        while tasks.join_next().await.is_some() {}
        info!("scheduler stopped");
    }
}

async fn run_worker(worker: Worker, interval: Duration, shutdown: Shutdown) {
    let pipe = worker.pipe_name();
    info!(pipe, "pipeline worker starting");

    loop {
        if shutdown.is_triggered() {
            break;
        }

        worker.process(&shutdown).await;

        tokio::select! {
            () = shutdown.triggered() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    info!(pipe, "pipeline worker stopped");
}
