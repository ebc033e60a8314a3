//! netorchd: process wiring for the network automation orchestrator.
//!
//! There is no HTTP/WebSocket listener here (spec §1 "Out of scope") —
//! this binary brings up storage, the connection stack, and the engine,
//! runs restart recovery, then idles until a shutdown signal, draining
//! any active jobs before exit. A real deployment embeds these same
//! pieces behind whatever external API adapter it chooses; `netorch-wire`
//! is the DTO contract that adapter would speak.

use netorch_adapters::{ConnectionManager, CredentialStore, JumphostManager, SshTelnetAdapter};
use netorch_core::SystemClock;
use netorch_daemon::{config, startup};
use netorch_engine::{JobManager, ProgressBus, StaticDirectory};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let data_root = config::data_root();
    tracing::info!(data_root = %data_root.display(), "starting netorchd");

    let startup::StartupResult { storage, recovered_job_ids } = startup::startup(&data_root).await?;
    if !recovered_job_ids.is_empty() {
        tracing::warn!(count = recovered_job_ids.len(), "recovered non-terminal jobs as failed");
    }

    let credentials = Arc::new(CredentialStore::open(&config::encryption_key_path())?);
    let connections = Arc::new(ConnectionManager::new(SshTelnetAdapter::new(Arc::clone(&credentials))));
    let jumphost_adapter = Arc::new(SshTelnetAdapter::new(Arc::clone(&credentials)));
    let jumphost = Arc::new(JumphostManager::new(jumphost_adapter, config::resolve_jumphost_config()));

    let clock = SystemClock;
    let bus = Arc::new(ProgressBus::new(clock.clone(), config::progress_bus_buffer()));
    let directory = Arc::new(StaticDirectory::new(Vec::new()));
    let job_store = Arc::new(storage.jobs);
    let artifacts = Arc::new(storage.artifacts);

    let scheduler = Arc::new(netorch_engine::BatchScheduler::new(
        Arc::clone(&connections),
        Arc::clone(&directory),
        Arc::clone(&job_store),
        Arc::clone(&artifacts),
        Arc::clone(&bus),
        Arc::clone(&jumphost),
        clock.clone(),
        config::ssh_connect_timeout(),
        config::ssh_read_timeout(),
    ));
    let job_manager = JobManager::new(scheduler, Arc::clone(&job_store), directory, Arc::clone(&bus), clock.clone());

    tracing::info!("netorchd ready, awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining active jobs");
    netorch_daemon::drain(&job_manager, &job_store, config::drain_timeout(), &clock).await;

    Ok(())
}
