use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    pub server: HealthCheckServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckServerConfig {
    pub port: u16,
}
