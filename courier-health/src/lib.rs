//! Liveness endpoint for the processor.

pub mod config;
pub mod error;
pub mod server;

pub use config::{HealthCheckConfig, HealthCheckServerConfig};
pub use error::HealthError;
pub use server::HealthServer;
