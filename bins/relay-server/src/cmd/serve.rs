use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;
use producer::{build_source, spawn_producer};
use relay_api_server::AppState;
use telemetry_store::TelemetryStore;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("telemetry-relay starting");

    // --- Load config ---
    let mut config = ServerConfig::resolve(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.api_port = port;
    }
    config.validate()?;
    tracing::info!(
        source = config.source.kind(),
        key_field = %config.key_field,
        retry = ?config.retry,
        "loaded config"
    );

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let shutdown = shutdown_signal()?;

    // --- Store: one per process, shared by producer and API ---
    let store = Arc::new(TelemetryStore::new());

    // --- Bind before spawning anything, so a busy port fails startup ---
    let listener = relay_api_server::bind(&config.api_host, config.api_port).await?;

    // --- Producer ---
    let source = build_source(&config.source);
    let producer_handle = spawn_producer(
        source,
        store.clone(),
        config.key_field.clone(),
        config.retry,
        token.clone(),
    );
    tracing::info!(source = config.source.kind(), "spawned producer");

    // --- API server (HTTP + WS) ---
    let state = AppState::new(
        store.clone(),
        Duration::from_millis(config.ws_interval_ms),
        token.clone(),
    );
    let api_handle = tokio::spawn(async move {
        if let Err(e) = relay_api_server::serve(listener, state).await {
            tracing::error!(error = %e, "api server error");
        }
    });

    tracing::info!(host = %config.api_host, port = config.api_port, "api server (http+ws) listening");
    tracing::info!("relay ready");

    // --- Ожидание SIGINT / SIGTERM ---
    shutdown.await?;
    tracing::info!("shutting down...");

    // Signal all tasks to stop cooperatively
    token.cancel();

    // Drain: wait up to the grace period, then abort anything still running
    let grace = Duration::from_millis(config.shutdown_grace_ms);
    let producer_abort = producer_handle.abort_handle();
    match tokio::time::timeout(grace, producer_handle).await {
        Ok(Ok(exit)) => tracing::info!(exit = ?exit, "producer finished"),
        Ok(Err(e)) => tracing::error!(error = %e, "producer task failed"),
        Err(_) => {
            tracing::warn!("producer did not stop in time, aborting");
            producer_abort.abort();
        }
    }

    let api_abort = api_handle.abort_handle();
    if tokio::time::timeout(grace, api_handle).await.is_err() {
        tracing::warn!("api server did not stop in time, aborting");
        api_abort.abort();
    }

    let status = store.status().await;
    tracing::info!(cars = status.cars, updates = status.updates, "shutdown complete");
    Ok(())
}

/// Ждёт Ctrl+C или SIGTERM (остановка pod'а).
///
/// Обработчик SIGTERM ставится сразу при вызове, до первого poll,
/// чтобы сигнал, пришедший во время старта, не убил процесс.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = std::io::Result<()>>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
        Ok::<(), std::io::Error>(())
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = std::io::Result<()>>> {
    Ok(tokio::signal::ctrl_c())
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::shutdown_signal;

    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let signal = shutdown_signal().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), signal)
            .await
            .expect("SIGTERM not observed")
            .unwrap();
    }
}
