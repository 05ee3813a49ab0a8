//! Sirberus server binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sirberus::container::{ContainerCatalog, DockerRuntime, discover_host};
use sirberus::metrics::{CgroupCpuReader, MetricSampler};
use sirberus::systemd::{ServiceCatalog, SystemctlManager};
use sirberus::{AppState, Config, router};
use sirberus_shared::constants::metrics::JANITOR_INTERVAL;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let _log_guard = sirberus::logging::init_logging(&config.log_level, config.log_dir.as_deref())
        .context("failed to initialize logging")?;

    let addr = config.bind_addr().context("invalid listen address")?;
    let shutdown = CancellationToken::new();

    let sampler = MetricSampler::default();
    let janitor = sampler.spawn_janitor(JANITOR_INTERVAL, shutdown.child_token());

    let services = ServiceCatalog::new(
        Arc::new(SystemctlManager::new(&config.systemctl)),
        sampler.clone(),
        CgroupCpuReader::new(&config.cgroup_root),
    );

    let containers = match discover_host(config.docker_host.as_deref()) {
        Some(host) => match DockerRuntime::connect(&host) {
            Ok(runtime) => Some(ContainerCatalog::new(Arc::new(runtime), sampler.clone())),
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Container runtime unavailable, container routes disabled");
                None
            }
        },
        None => {
            tracing::warn!("No container runtime socket found, container routes disabled");
            None
        }
    };

    let state = AppState::new(services, containers, shutdown.clone())
        .with_journalctl(config.journalctl.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Sirberus listening");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested");
        signal_token.cancel();
    });

    let server_token = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await
        .context("server error")?;

    shutdown.cancel();
    let _ = janitor.await;
    tracing::info!("Sirberus stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
