//! Long-running server mode
//!
//! Runs the scan scheduler and the HTTP API side by side until SIGINT or
//! SIGTERM, then cancels the scheduler and drains open connections.

use anyhow::{Context, Result};
use netroster_core::scanner::{privileges, SystemResolver};
use netroster_core::{
    api, AnnotationStore, Config, DeviceRegistry, DeviceService, LoadOutcome, Scheduler,
    SchedulerSettings,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run scheduler + HTTP server with the given configuration
pub async fn run_server(config: Config) -> Result<()> {
    config.prepare_storage_dir()?;

    let store = Arc::new(AnnotationStore::load(&config.storage.annotations_path).await);
    if let LoadOutcome::Corrupt(_) = store.load_outcome() {
        tracing::warn!(
            "Serving with an empty roster; {} will be replaced on the next save",
            store.path().display()
        );
    }

    let registry = Arc::new(DeviceRegistry::new());

    if let Some(warning) =
        privileges::capability_warning(config.scan.backend, privileges::is_elevated())
    {
        tracing::warn!("{}", warning);
    }

    let scheduler = Scheduler::new(
        registry.clone(),
        store.clone(),
        config.scan.backend.executor(),
        Arc::new(SystemResolver::new()),
        SchedulerSettings::from(&config.scan),
    );

    let cancel = CancellationToken::new();
    let scan_task = tokio::spawn(scheduler.run(cancel.clone()));

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Serving on http://{}", addr);

    let app = api::router(DeviceService::new(registry, store));

    tokio::spawn(shutdown_signal(cancel.clone()));

    let server_cancel = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await;

    // The server can also stop on its own (listener error); take the scheduler down with it.
    cancel.cancel();
    if let Err(e) = scan_task.await {
        tracing::error!("Scheduler task ended abnormally: {}", e);
    }

    served.context("HTTP server failed")?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then fire `cancel`
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        _ = cancel.cancelled() => return,
    }

    cancel.cancel();
}
