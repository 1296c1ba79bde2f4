//! Venueboard - room signage views for a hotel booking API
//!
//! Loads configuration, restores the response cache from its snapshot, serves the
//! views until interrupted, then saves the cache back to disk.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use venueboard::auth::TokenManager;
use venueboard::cache::{load_or_empty, save_snapshot, Cache};
use venueboard::cli::{Cli, Config};
use venueboard::data::{load_room_group_mapping, ApiClient, Payload, ReqwestTransport, Transport};
use venueboard::refresh::RefreshHandle;
use venueboard::server::{self, AppState};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves when the process is asked to stop
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to listen for SIGTERM: {}", err);
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
    tracing::info!("shutdown requested");
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let cache: Arc<Cache<Payload>> = if config.cache_level.caches_tokens() {
        Arc::new(load_or_empty(&config.snapshot_path))
    } else {
        Arc::new(Cache::new())
    };

    match load_room_group_mapping(&cache, &config.mapping_path) {
        Ok(groups) => tracing::info!(groups = groups.len(), "loaded room group mapping"),
        Err(err) => tracing::warn!(
            path = %config.mapping_path.display(),
            "room group mapping not loaded: {}",
            err
        ),
    }

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.upstream_timeout)?);
    let tokens = Arc::new(TokenManager::new(
        transport.clone(),
        cache.clone(),
        config.api.clone(),
        config.token_settings(),
    ));
    let api = ApiClient::new(
        transport,
        cache.clone(),
        tokens.clone(),
        config.api.clone(),
        config.cache_level,
    );

    let shutdown = CancellationToken::new();
    let maintenance = RefreshHandle::spawn(
        config.refresh.clone(),
        cache.clone(),
        tokens,
        shutdown.child_token(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let state = AppState::new(api, config.timezone, shutdown.clone());
    let served = server::serve(listener, state).await;

    shutdown.cancel();
    maintenance.shutdown().await;

    if config.cache_level.caches_tokens() {
        match save_snapshot(&cache, &config.snapshot_path) {
            Ok(entries) => tracing::info!(
                entries,
                path = %config.snapshot_path.display(),
                "saved cache snapshot"
            ),
            Err(err) => tracing::warn!("failed to save cache snapshot: {}", err),
        }
    }

    served?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal in production
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{}", err);
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("server failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
