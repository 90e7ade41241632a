//! Taskhive server entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use taskhive_core::{
    api::{self, AppState},
    config::Config,
    events::register_system_listeners,
    jobs::HandlerRegistry,
    orchestrator::Dispatcher,
    telemetry,
};

/// Path of an optional configuration file.
const CONFIG_PATH_ENV: &str = "TASKHIVE_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = Config::load_from(config_path.as_deref())?;

    let telemetry = telemetry::init_telemetry(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = config.workers.count,
        max_workers = config.workers.max_workers,
        "Starting Taskhive"
    );

    let dispatcher = Arc::new(Dispatcher::new(&config.workers, HandlerRegistry::with_builtins()));
    register_system_listeners(dispatcher.listeners())?;
    dispatcher.scale_to(config.workers.count)?;

    let shutdown = CancellationToken::new();
    let dispatch_loop = {
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { dispatcher.run(shutdown).await })
    };

    let count_watch = config.workers.reload_interval.map(|interval| {
        let (counts, receiver) = watch::channel(config.workers.count);
        tokio::spawn(reload_worker_count(config_path.clone(), interval, counts, shutdown.clone()));
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { dispatcher.watch_count(receiver, shutdown).await })
    });

    let app = api::build_router(AppState::new(dispatcher, telemetry.metrics));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    dispatch_loop.await?;
    if let Some(count_watch) = count_watch {
        count_watch.await?;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Re-read the configuration every `interval` and publish `workers.count`.
async fn reload_worker_count(
    path: Option<PathBuf>,
    interval: Duration,
    counts: watch::Sender<usize>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match Config::load_from(path.as_deref()) {
                    Ok(config) => {
                        let count = config.workers.count;
                        counts.send_if_modified(|current| {
                            let changed = *current != count;
                            *current = count;
                            changed
                        });
                    }
                    Err(error) => tracing::warn!(error = %error, "Failed to reload configuration"),
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
