use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, StoreConfig};
use crate::dispatcher::NotificationDispatcher;
use crate::monitor::{MonitorContext, StoreMonitor};
use crate::plugins::ExtractorRegistry;
use crate::retry::RetryPolicy;
use crate::scraper::StoreClient;
use crate::seen_state::SeenStateStore;
use crate::utils::error::{AppError, Result};

/// Runs one monitor task per store and owns process-wide shutdown.
pub struct Orchestrator {
    stores: Vec<StoreConfig>,
    registry: ExtractorRegistry,
    ctx: MonitorContext,
    persist_path: Option<PathBuf>,
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Orchestrator {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let ctx = MonitorContext {
            client: StoreClient::new(&config.http)?,
            seen: Arc::new(SeenStateStore::new()),
            dispatcher: NotificationDispatcher::new(&config.delivery)?,
            endpoints: config.endpoints.clone().into(),
            retry: RetryPolicy::from_config(&config.retry),
        };

        Ok(Self {
            stores: config.store_configs()?,
            registry: ExtractorRegistry::default(),
            ctx,
            persist_path: config.state.persist_path.clone(),
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        })
    }

    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_context(mut self, ctx: MonitorContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn seen_state(&self) -> &Arc<SeenStateStore> {
        &self.ctx.seen
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Names of the stores whose monitors are running.
    pub fn running(&self) -> Vec<&str> {
        self.handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Restore persisted state, then spawn a monitor for every store whose
    /// extractor can be built. A store that cannot start is logged and skipped.
    pub async fn start(&mut self) -> Result<usize> {
        if let Some(path) = &self.persist_path {
            let persisted = SeenStateStore::load(path).await?;
            self.ctx.seen.restore(persisted.snapshot());
        }

        for store in &self.stores {
            let extractor = match self.registry.build(store) {
                Ok(extractor) => extractor,
                Err(e) => {
                    tracing::error!("Store {} will not be monitored: {}", store.name, e);
                    continue;
                }
            };

            let monitor = StoreMonitor::new(
                store.clone(),
                extractor,
                self.ctx.clone(),
                self.cancel.child_token(),
            );
            let handle = tokio::spawn(monitor.run());
            self.handles.push((store.name.clone(), handle));
        }

        if self.handles.is_empty() {
            return Err(AppError::Internal("no store monitor could be started".to_string()));
        }
        tracing::info!("Started {} of {} store monitors", self.handles.len(), self.stores.len());
        Ok(self.handles.len())
    }

    /// Cancel every monitor, wait for in-flight work, then persist state.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Stopping {} monitors", self.handles.len());
        self.cancel.cancel();

        for (name, handle) in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!("Monitor for {} ended abnormally: {}", name, e);
            }
        }

        if let Some(path) = &self.persist_path {
            self.ctx.seen.save(path).await?;
            tracing::info!("Seen-state saved to {}", path.display());
        }
        Ok(())
    }

    /// Start, wait for `signal`, then shut down.
    pub async fn run_until<F>(mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        tracing::info!("Shutdown signal received; stopping monitors...");
        self.shutdown().await
    }
}
