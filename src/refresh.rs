//! Background maintenance
//!
//! Runs two optional timers detached from any request: a janitor that sweeps
//! expired cache entries, and a keep-warm task that renews the access token before
//! a request has to wait for it. Both stop when the shutdown token fires.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{TokenManager, TokenOutcome};
use crate::cache::Cache;
use crate::data::Payload;

/// Configuration for the background intervals
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// How often expired entries are purged; `None` disables the janitor
    pub sweep_interval: Option<Duration>,
    /// How often the token state machine is run; `None` disables keep-warm
    pub token_keepalive: Option<Duration>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Some(Duration::from_secs(20 * 60)),
            token_keepalive: None,
        }
    }
}

/// Handle for the spawned background tasks
pub struct RefreshHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Spawns the enabled tasks; they stop when `shutdown` is cancelled
    pub fn spawn(
        config: RefreshConfig,
        cache: Arc<Cache<Payload>>,
        tokens: Arc<TokenManager>,
        shutdown: CancellationToken,
    ) -> Self {
        let mut tasks = Vec::new();

        if let Some(period) = config.sweep_interval.filter(|d| !d.is_zero()) {
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let removed = cache.purge_expired();
                            tracing::debug!(removed, remaining = cache.len(), "swept expired cache entries");
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }
            }));
        }

        let keepalive = config.token_keepalive.filter(|d| !d.is_zero());
        if keepalive.is_some() && !tokens.caches_tokens() {
            // Every tick would be a full login with nothing kept.
            tracing::warn!("token keep-warm disabled because tokens are not cached");
        }
        if let Some(period) = keepalive.filter(|_| tokens.caches_tokens()) {
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            // Detached from request cancellation; only shutdown stops it.
                            match tokens.acquire(&CancellationToken::new()).await {
                                TokenOutcome::Failed(_) => {}
                                TokenOutcome::UseCached(_) => tracing::debug!("access token still valid"),
                                _ => tracing::info!("background token renewal succeeded"),
                            }
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }
            }));
        }

        Self { shutdown, tasks }
    }

    /// Number of running background tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops the background tasks and waits for them to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!("background task failed: {}", err);
            }
        }
    }
}
