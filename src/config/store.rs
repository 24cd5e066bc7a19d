use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hotwatch::{Event, EventKind, Hotwatch};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::loader::ConfigLoader;
use crate::config::model::{HostMode, RuntimeConfig};
use crate::utils::error::{ConfigError, GatewayResult};

/// Quiet window used to coalesce editor save-storms into one reload.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// Outcome of a reload attempt.
#[derive(Debug, Clone)]
pub enum ReloadOutcome {
    /// A new snapshot was published.
    Applied(Arc<RuntimeConfig>),
    /// The reload was intentionally skipped; the old snapshot stays current.
    Skipped(&'static str),
}

/// Holds the published configuration snapshot. Requests capture the `Arc` at
/// their start and keep using it until they finish; publishing a new snapshot
/// never disturbs captured ones.
pub struct ConfigStore {
    path: PathBuf,
    loader: ConfigLoader,
    current: RwLock<Arc<RuntimeConfig>>,
}

impl ConfigStore {
    pub fn new(initial: RuntimeConfig, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loader: ConfigLoader::new(),
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Load the file at `path` and publish it as the first snapshot.
    pub async fn from_file(path: impl Into<PathBuf>) -> GatewayResult<Self> {
        let path = path.into();
        let loader = ConfigLoader::new();
        let config = loader.load(&path).await?;
        Ok(Self {
            path,
            loader,
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The currently published snapshot.
    pub async fn current(&self) -> Arc<RuntimeConfig> {
        self.current.read().await.clone()
    }

    /// Publish a snapshot directly. Used by tests and by hosts that manage
    /// their own config lifecycle.
    pub async fn publish(&self, config: RuntimeConfig) -> Arc<RuntimeConfig> {
        let snapshot = Arc::new(config);
        *self.current.write().await = snapshot.clone();
        snapshot
    }

    /// Re-load the config file and, if it is valid and reload is permitted,
    /// atomically swap the published snapshot.
    pub async fn try_reload(&self) -> GatewayResult<ReloadOutcome> {
        let previous = self.current().await;

        if previous.runtime.host.mode == HostMode::Production {
            warn!("config changed on disk but hot-reload is disabled in production mode");
            return Ok(ReloadOutcome::Skipped("hot-reload disabled in production"));
        }

        let next = self.loader.load(&self.path).await?;

        if next.runtime.host.mode != previous.runtime.host.mode {
            warn!(
                "config reload would change host mode from {:?} to {:?}; ignoring",
                previous.runtime.host.mode, next.runtime.host.mode
            );
            return Ok(ReloadOutcome::Skipped("host mode change across reload"));
        }

        let snapshot = self.publish(next).await;
        info!("published new configuration snapshot");
        Ok(ReloadOutcome::Applied(snapshot))
    }
}

/// Watches the config file and drives reloads through a [`ConfigStore`].
/// Dropping the watcher stops watching.
pub struct ConfigWatcher {
    _hotwatch: Hotwatch,
}

impl ConfigWatcher {
    /// Start watching the store's config file. `on_reload` is invoked with
    /// every newly published snapshot; reload failures keep the previous
    /// snapshot and are logged, never propagated to in-flight requests.
    pub fn spawn<F>(store: Arc<ConfigStore>, on_reload: F) -> GatewayResult<Self>
    where
        F: Fn(Arc<RuntimeConfig>) + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let mut hotwatch = Hotwatch::new_with_custom_delay(RELOAD_DEBOUNCE)
            .map_err(|e| ConfigError::Watch(e.to_string()))?;
        hotwatch
            .watch(store.path().to_path_buf(), move |event: Event| {
                debug!("config watcher received event: {:?}", event.kind);
                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => {
                        let _ = tx.send(());
                    }
                    _ => {}
                }
            })
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                match store.try_reload().await {
                    Ok(ReloadOutcome::Applied(snapshot)) => on_reload(snapshot),
                    Ok(ReloadOutcome::Skipped(reason)) => {
                        debug!("config reload skipped: {reason}");
                    }
                    Err(err) => {
                        error!("config reload failed, keeping previous snapshot: {err}");
                    }
                }
            }
        });

        Ok(Self {
            _hotwatch: hotwatch,
        })
    }
}
