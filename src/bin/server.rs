use std::sync::Arc;
use std::time::Duration;

use alertics::{
    actors::FlushHandle,
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{ServerConfig, StorageMode},
    orchestrator::Orchestrator,
    storage::{DatabaseStorage, MemoryStorage, MetricStorage},
};
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Window for in-flight requests to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("alertics", LevelFilter::DEBUG),
        ("alertics_server", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let config = ServerConfig::parse();
    trace!("starting server on {}", config.address);

    let (storage, flusher): (Arc<dyn MetricStorage>, Option<(FlushHandle, bool)>) =
        match config.storage_mode() {
            StorageMode::Memory(settings) => {
                let write_through = settings.write_through();
                let storage: Arc<dyn MetricStorage> = Arc::new(MemoryStorage::new());
                let orchestrator = Orchestrator::new(storage.clone(), settings);
                orchestrator.restore().await;
                (storage, Some((orchestrator.start(), write_through)))
            }
            StorageMode::Database { dsn, retry } => {
                match DatabaseStorage::connect(&dsn, &retry).await {
                    Ok(storage) => (Arc::new(storage), None),
                    Err(e) => {
                        error!("cannot open database storage: {e}");
                        return Err(e.into());
                    }
                }
            }
        };

    info!("using {} storage", storage.name());

    let mut state = ApiState::new(storage.clone()).with_signer(config.signer());
    if let Some((handle, true)) = &flusher {
        state = state.with_write_through(handle.clone());
    }

    let server = spawn_api_server(
        ApiConfig {
            bind_addr: config.address.clone(),
        },
        state,
    )
    .await?;

    shutdown_signal().await;
    info!("shutting down");

    if !server.shutdown(SHUTDOWN_GRACE).await {
        warn!("some requests were cut off");
    }

    if let Some((flusher, _)) = flusher {
        match flusher.shutdown().await {
            Some(stats) => info!(
                "flusher stopped after {} snapshots ({} failed)",
                stats.flush_count, stats.failed_flushes
            ),
            None => warn!("flusher was already stopped"),
        }
    }

    if let Err(e) = storage.close().await {
        error!("error closing storage: {e}");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(mut term), Ok(mut quit)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = quit.recv() => {}
                }
            }
            _ => {
                error!("cannot install unix signal handlers");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
