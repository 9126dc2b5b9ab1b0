//! Health check HTTP server.
//!
//! `GET /health-check` answers `200 OK` while the process runs. Once the
//! shutdown scope fires the handler answers `503` for requests still in
//! flight and the server drains.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use courier_common::Shutdown;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::{config::HealthCheckConfig, error::HealthError};

pub struct HealthServer {
    listener: TcpListener,
}

impl HealthServer {
    /// Bind to the configured port on all interfaces.
    ///
    /// # Errors
    ///
    /// [`HealthError::Bind`] when the port is unavailable.
    pub async fn bind(config: &HealthCheckConfig) -> Result<Self, HealthError> {
        let address = format!("0.0.0.0:{}", config.server.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| HealthError::Bind { address, source })?;

        tracing::info!(port = config.server.port, "health check server bound");
        Ok(Self { listener })
    }

    /// The bound local port (useful when configured with port 0).
    ///
    /// # Errors
    ///
    /// If the listener's local address cannot be read.
    pub fn port(&self) -> Result<u16, HealthError> {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|err| HealthError::Server(err.to_string()))
    }

    /// Serve until the shutdown scope fires, then drain.
    ///
    /// # Errors
    ///
    /// [`HealthError::Server`] on a runtime failure.
    pub async fn serve(self, shutdown: Shutdown) -> Result<(), HealthError> {
        let router = Router::new()
            .route("/health-check", get(health_check_handler))
            .with_state(shutdown.clone())
            // Probes must answer fast or not at all.
            .layer(TimeoutLayer::new(Duration::from_secs(1)));

        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                shutdown.triggered().await;
                tracing::info!("health check server received shutdown");
            })
            .await
            .map_err(|err| HealthError::Server(err.to_string()))?;

        tracing::info!("health check server stopped");
        Ok(())
    }
}

async fn health_check_handler(State(shutdown): State<Shutdown>) -> impl IntoResponse {
    if shutdown.is_triggered() {
        (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
    } else {
        (StatusCode::OK, "OK")
    }
}
