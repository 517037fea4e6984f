//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration (file or defaults + environment)
//! - Connect the cache backend
//! - Build the HTTP server and its shared state
//! - Start the config watcher when a file is in use
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::path::Path;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use crate::cache::{connect_backend, CacheError};
use crate::config::{default_config, load_config, ConfigError, ConfigWatcher, GatewayConfig};
use crate::http::HttpServer;
use crate::upstream::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cache backend: {0}")]
    Cache(#[from] CacheError),

    #[error("upstream client: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("config watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// Everything `main` needs to start serving.
pub struct Gateway {
    pub config: GatewayConfig,
    pub server: HttpServer,
    pub config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
    /// Dropping the watcher stops hot reload.
    pub watcher: Option<RecommendedWatcher>,
}

/// Load config from `config_path`, or defaults plus environment.
pub fn load(config_path: Option<&Path>) -> Result<GatewayConfig, StartupError> {
    Ok(match config_path {
        Some(path) => load_config(path)?,
        None => default_config()?,
    })
}

/// Assemble the gateway from a loaded config. `config_path`, when given,
/// is watched for reloads.
pub async fn bootstrap(
    config: GatewayConfig,
    config_path: Option<&Path>,
) -> Result<Gateway, StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        build_id = %config.cache.build_id,
        bulkheads = config.bulkheads.len(),
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );
    if config.upstream.api_key.is_empty() {
        tracing::warn!("No NYT API key configured; upstream calls will be rejected");
    }

    let backend = connect_backend(&config.cache).await?;
    let server = HttpServer::new(config.clone(), backend)?;

    let (watcher, config_updates) = match config_path {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        None => {
            // No file to watch; the closed channel means no reloads.
            let (_, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    Ok(Gateway {
        config,
        server,
        config_updates,
        watcher,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_with_defaults_uses_memory_backend() {
        let gateway = bootstrap(GatewayConfig::default(), None).await.unwrap();
        assert!(gateway.watcher.is_none());
        assert_eq!(gateway.server.state().cache.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_load_rejects_missing_file() {
        let err = load(Some(Path::new("/nonexistent/gateway.toml"))).unwrap_err();
        assert!(matches!(err, StartupError::Config(ConfigError::Io { .. })));
    }
}
