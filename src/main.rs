use std::path::Path;

use cds::utils::file_io;
use cds::Error;
use cds::Result;
use cds::Server;
use cds::Settings;
use serde_json::Value;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = Settings::load(None)?;

    // Initializing Logs
    let _guard = init_observability(settings.server.log_dir.as_deref())?;

    // The daemon serves configurations as opaque JSON documents
    let server = Server::<Value>::new(settings.clone());
    if let Some(seed_file) = &settings.server.seed_file {
        let entries = file_io::read_seed_file(seed_file).await?;
        let delta = server.update_config(entries)?;
        info!(?seed_file, added = delta.added.len(), "store seeded");
    }

    let token = CancellationToken::new();
    let addr = server.start(token.clone()).await?;
    info!(%addr, "Application started. Waiting for CTRL+C signal...");

    // Listen on Shutdown Signal
    if let Err(e) = graceful_shutdown(token).await {
        error!("Failed to shutdown: {:?}", e);
        return Err(e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(token: CancellationToken) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    token.cancel();

    // Let open connections say goodbye
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    info!("Shutdown completed");
    Ok(())
}

pub fn init_observability(log_dir: Option<&Path>) -> Result<WorkerGuard> {
    let (non_blocking, guard) = match log_dir {
        Some(dir) => {
            let log_file = file_io::open_file_for_append(&dir.join("cdsd.log"))?;
            tracing_appender::non_blocking(log_file)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry()
        .with(base_subscriber)
        .try_init()
        .map_err(|e| Error::Fatal(format!("failed to install tracing subscriber: {e}")))?;

    Ok(guard)
}
