use courier::{App, Config};
use courier_common::Shutdown;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

#[cfg(not(unix))]
compile_error!("courier relies on unix process signals");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courier_common::logging::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    let app = App::new(config).await?;

    let shutdown = Shutdown::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let signal_scope = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
        info!("shutdown signal received");
        signal_scope.trigger();
    });

    app.run(shutdown).await;
    Ok(())
}
