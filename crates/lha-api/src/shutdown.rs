//! Graceful shutdown handling for the web server.

use std::time::Duration;

use lha_devices::TransportPublisher;

/// Upper bound for releasing the transport after the listener has stopped.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Disconnect the transport, giving up after a few seconds.
pub async fn release_transport(publisher: &dyn TransportPublisher, started_at: i64) {
    tracing::info!(transport = publisher.name(), "Releasing transport");
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, publisher.shutdown()).await.is_err() {
        tracing::warn!(
            "Transport shutdown timed out after {} seconds",
            SHUTDOWN_TIMEOUT.as_secs()
        );
    }

    let uptime = chrono::Utc::now().timestamp() - started_at;
    tracing::info!("Shutdown complete. Server uptime: {} seconds", uptime.max(0));
}
