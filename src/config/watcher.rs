//! Configuration file watcher for hot reload.
//!
//! Each modify/create event re-runs the full load pipeline; only configs
//! that pass validation are forwarded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Watches the gateway config file and publishes validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver the server consumes.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    reload(&path, &tx);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<GatewayConfig>) {
    tracing::info!(path = %path.display(), "Config change detected, reloading");
    match load_config(path) {
        Ok(config) => {
            if tx.send(config).is_err() {
                tracing::debug!("Config receiver dropped");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Config reload rejected, keeping current configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_forwards_only_valid_configs() {
        let dir = std::env::temp_dir().join(format!("gateway-watch-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("gateway.toml");
        let (tx, mut rx) = mpsc::unbounded_channel();

        std::fs::write(&file, "[cache.policies.books]\nttl_secs = 7\nmax_age_secs = 1\ns_maxage_secs = 1\nstale_while_revalidate_secs = 0\n").unwrap();
        reload(&file, &tx);
        let config = rx.try_recv().unwrap();
        assert_eq!(config.cache.policies.books.ttl_secs, 7);

        std::fs::write(&file, "[timeouts]\nrequest_secs = 0\n").unwrap();
        reload(&file, &tx);
        assert!(rx.try_recv().is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
