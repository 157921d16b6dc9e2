// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gateway daemon: startup, serving and shutdown

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use nfsg_core::{
    application::{StandardVolumeService, VolumeService},
    domain::{gateway_config::GatewayConfig, repository::VolumeStore},
    infrastructure::{
        exports::ExportfsProjector, nfsd::NfsdBootstrap, repositories::SledVolumeStore,
    },
    presentation::app,
};

/// Command-line values that win over file and environment configuration
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub listen_addr: Option<String>,
    pub root: Option<PathBuf>,
    pub exportfs_path: Option<PathBuf>,
    pub no_bootstrap: bool,
}

impl ServeOverrides {
    pub fn apply(self, config: &mut GatewayConfig) {
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(path) = self.exportfs_path {
            config.exportfs_path = Some(path);
        }
        if self.no_bootstrap {
            config.bootstrap_nfsd = false;
        }
    }
}

/// Load, override and validate the configuration the daemon will run with
pub fn resolve_config(
    config_path: Option<PathBuf>,
    overrides: ServeOverrides,
) -> Result<GatewayConfig> {
    let mut config =
        GatewayConfig::load_or_default(config_path).context("Failed to load configuration")?;
    overrides.apply(&mut config);
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// Configured `exportfs`, else the first one on `PATH`
pub fn resolve_exportfs(config: &GatewayConfig) -> Result<PathBuf> {
    match &config.exportfs_path {
        Some(path) => Ok(path.clone()),
        None => which::which("exportfs").context("exportfs not found on PATH"),
    }
}

pub async fn run_gateway(config_path: Option<PathBuf>, overrides: ServeOverrides) -> Result<()> {
    let config = resolve_config(config_path, overrides)?;
    info!(
        root = %config.root.display(),
        listen = %config.listen_addr,
        "nfsg gateway starting (PID: {})",
        std::process::id()
    );

    let exportfs = resolve_exportfs(&config)?;
    info!("Using exportfs at {}", exportfs.display());

    let nfs_dir = config.nfs_dir();
    tokio::fs::create_dir_all(&nfs_dir)
        .await
        .with_context(|| format!("Failed to create volume directory {}", nfs_dir.display()))?;

    let db_path = config.database_path();
    let store = Arc::new(
        SledVolumeStore::open_with_timeout(&db_path, config.db_open_timeout)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );

    if config.bootstrap_nfsd {
        NfsdBootstrap::default()
            .run()
            .await
            .context("Failed to set up the kernel NFS server")?;
    } else {
        info!("Skipping NFS server bootstrap");
    }

    let projector = Arc::new(ExportfsProjector::new(exportfs));
    let service = Arc::new(StandardVolumeService::new(
        store.clone(),
        projector,
        config.root.clone(),
    ));

    let report = service.reload().await.context("Failed to reload exports")?;
    if report.failed > 0 {
        warn!(failed = report.failed, "Some volumes could not be re-exported");
    }

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

    info!("Gateway listening on {}", config.listen_addr);

    let served = axum::serve(listener, app(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    info!("Gateway shutting down");
    service.shutdown().await;
    if let Err(e) = store.flush().await {
        error!(error = %e, "Failed to flush volume database");
    }

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
