use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use shellgate::config::{HostsFile, ServerConfig, paths};
use shellgate::gateway::{self, AppState, OriginPolicy, StaticTokenIdentity};
use shellgate::proxy::ProxyContext;
use shellgate::ssh::{SshConnector, SshDialer};
use shellgate::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = paths::ensure_log_dir().ok();
    let _guard = shellgate::logging::init_logging(log_dir);

    tracing::info!("Starting shellgate {}", env!("CARGO_PKG_VERSION"));
    if let Some(dir) = paths::log_dir() {
        tracing::info!("Logging to {}", dir.display());
    }

    // Only argument: an explicit config path
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref()).context("loading config")?;

    let store = MemoryStore::new();
    if let Some(path) = config.hosts_file.as_deref().filter(|p| p.exists()) {
        let hosts = HostsFile::load(path)
            .with_context(|| format!("loading hosts from {}", path.display()))?;
        for host in hosts.hosts {
            store.insert_host(host);
        }
        tracing::info!(count = store.host_count(), "Loaded hosts");
    } else {
        tracing::warn!("No hosts file, every connect will report host not found");
    }

    let identity = StaticTokenIdentity::from_config(&config.identity);
    if identity.is_empty() {
        tracing::warn!("No identity tokens configured, every request will be refused");
    }

    let dialer = SshDialer::new(SshConnector::new(&config.ssh), config.ssh.max_transfer_bytes);
    let state = AppState {
        proxy: Arc::new(ProxyContext {
            store: Arc::new(store),
            dialer: Arc::new(dialer),
            idle_timeout: config.idle_timeout(),
        }),
        identity: Arc::new(identity),
        origins: Arc::new(OriginPolicy::new(&config.server.allowed_origins)),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        gateway::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
}
