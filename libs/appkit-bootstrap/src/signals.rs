use anyhow::Result;
use tokio::signal;

/// Wait for termination signals (Ctrl+C, SIGTERM)
pub async fn wait_for_shutdown() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c().await.map_err(|e| {
            tracing::error!(%e, "Failed to install Ctrl+C handler");
            e
        })?;
        Ok::<&'static str, std::io::Error>("Ctrl+C")
    };

    #[cfg(unix)]
    let terminate = async {
        let mut handler = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
            tracing::error!(%e, "Failed to install SIGTERM handler");
            e
        })?;
        handler.recv().await;
        Ok::<&'static str, std::io::Error>("SIGTERM")
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<&'static str>>();

    let received = tokio::select! {
        result = ctrl_c => result?,
        result = terminate => result?,
    };

    tracing::info!(signal = received, "Shutdown signal received, initiating graceful shutdown");
    Ok(())
}
