//! Dependency wiring and the run loop.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use courier_common::Shutdown;
use courier_eml::EmlStorage;
use courier_health::HealthServer;
use courier_outbox::MySqlOutbox;
use courier_pipeline::{
    CallbackClient, CallbackPipe, IntakePipe, Scheduler, SenderPipe, Worker,
};
use courier_smtp::Mailer;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use tracing::{error, info};

use crate::config::Config;

/// Connection pool sizing for the outbox workload: four workers with up
/// to 25 concurrent row tasks each, short transactions.
const POOL_MAX_CONNECTIONS: u32 = 25;
const POOL_MIN_CONNECTIONS: u32 = 5;
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);

pub struct App {
    pool: MySqlPool,
    scheduler: Scheduler,
    health: HealthServer,
}

impl App {
    /// Construct every collaborator from configuration. Fails fast on an
    /// unreachable database, an unusable storage root, or a port that
    /// cannot be bound.
    ///
    /// # Errors
    ///
    /// Any initialisation failure; the process should exit non-zero.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_lifetime(POOL_MAX_LIFETIME)
            .connect(&config.mysql.url()?)
            .await
            .context("failed to connect to MySQL")?;

        let outbox = Arc::new(MySqlOutbox::new(pool.clone()));

        let storage = EmlStorage::new(&config.eml_storage.path);
        storage
            .init()
            .context("failed to initialise eml storage")?;

        let mailer = Arc::new(Mailer::new(config.smtp.clone()));
        let callback_client = Arc::new(
            CallbackClient::new(config.callback.clone())
                .context("failed to build callback client")?,
        );

        let scheduler = Scheduler::new(config.pipeline.interval)
            .with_worker(Worker::new(
                outbox.clone(),
                Arc::new(IntakePipe::new(
                    storage,
                    config.attachments.base_path.clone(),
                )),
            ))
            .with_worker(Worker::new(
                outbox.clone(),
                Arc::new(SenderPipe::new(mailer)),
            ))
            .with_worker(Worker::new(
                outbox.clone(),
                Arc::new(CallbackPipe::sent(callback_client.clone())),
            ))
            .with_worker(Worker::new(
                outbox,
                Arc::new(CallbackPipe::failed(callback_client)),
            ));

        let health = HealthServer::bind(&config.health_check)
            .await
            .context("failed to bind health check server")?;

        info!(
            interval_secs = config.pipeline.interval,
            "app initialised with 4 pipelines"
        );

        Ok(Self {
            pool,
            scheduler,
            health,
        })
    }

    /// Run until the shutdown scope fires, then release resources.
    pub async fn run(self, shutdown: Shutdown) {
        let health_shutdown = shutdown.clone();
        let health_task = tokio::spawn(self.health.serve(health_shutdown));

        self.scheduler.run(shutdown).await;

        match health_task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "health check server failed"),
            Err(err) => error!(error = %err, "health check task panicked"),
        }

        self.pool.close().await;
        info!("connection pool closed, shutdown complete");
    }
}
