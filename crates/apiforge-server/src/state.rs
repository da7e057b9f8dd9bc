//! Application state shared across handlers.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use apiforge_core::store::is_valid_source_id;
use apiforge_core::{
    ApiforgeError, Clock, Config, DescriptorStore, ResourceDescriptor, SearchService,
    SyncCoordinator, SyncReport, SystemClock, UsageAnalyzer, UsageReport, ALL_SOURCES_KEY,
};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Handle passed to every handler.
pub type SharedState = AppState;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    search: RwLock<SearchService>,
    usage: Mutex<UsageAnalyzer>,
    sync: SyncCoordinator,
    store: DescriptorStore,
}

impl AppState {
    /// Build state from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the search or usage settings are unusable.
    pub fn new(config: Config) -> apiforge_core::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build state with an injected clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the search or usage settings are unusable.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> apiforge_core::Result<Self> {
        let search = SearchService::with_clock(config.search.clone(), Arc::clone(&clock))?;
        let usage = UsageAnalyzer::new(config.usage.clone())?;
        let sync = SyncCoordinator::with_clock(Duration::from_secs(config.sync.timeout_secs), clock);
        let store = DescriptorStore::new(config.descriptors_dir());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                search: RwLock::new(search),
                usage: Mutex::new(usage),
                sync,
                store,
            }),
        })
    }

    /// The configuration the daemon started with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Read access to the search service.
    pub async fn search(&self) -> RwLockReadGuard<'_, SearchService> {
        self.inner.search.read().await
    }

    /// Write access to the search service.
    pub async fn search_mut(&self) -> RwLockWriteGuard<'_, SearchService> {
        self.inner.search.write().await
    }

    /// The sync coordinator.
    #[must_use]
    pub fn sync_coordinator(&self) -> &SyncCoordinator {
        &self.inner.sync
    }

    /// The descriptor file store.
    #[must_use]
    pub fn store(&self) -> &DescriptorStore {
        &self.inner.store
    }

    /// Reload descriptors from the store: one source, or every source when
    /// `source` is `None`.
    ///
    /// Files are read before the service lock is taken, so searches keep
    /// running against the previous descriptors until the swap.
    ///
    /// # Errors
    ///
    /// Returns an error if a run for the same key is in progress, or if a
    /// single requested source cannot be loaded.
    pub async fn sync(&self, source: Option<&str>) -> apiforge_core::Result<SyncReport> {
        if let Some(source) = source {
            if !is_valid_source_id(source) {
                return Err(ApiforgeError::InvalidSourceId(source.to_string()));
            }
        }

        let key = source.unwrap_or(ALL_SOURCES_KEY);
        let guard = self.inner.sync.begin(key)?;

        let loaded = match source {
            Some(source) => vec![(source.to_string(), self.inner.store.load(source).await?)],
            None => self.load_every_source().await?,
        };

        let mut search = self.inner.search.write().await;
        let mut removed = 0;
        let mut added = 0;

        if source.is_none() {
            // Sources whose files disappeared since the last sync.
            let on_disk: BTreeSet<&str> = loaded.iter().map(|(s, _)| s.as_str()).collect();
            let stale: BTreeSet<String> = search
                .descriptors()
                .iter()
                .filter(|d| !on_disk.contains(d.source.as_str()))
                .map(|d| d.source.clone())
                .collect();
            for gone in &stale {
                removed += search.remove_source(gone)?;
            }
        }

        let mut sources = Vec::with_capacity(loaded.len());
        for (source, descriptors) in loaded {
            let replaced = search.replace_source(&source, descriptors)?;
            removed += replaced.removed;
            added += replaced.added;
            sources.push(source);
        }
        let total = search.len();
        drop(search);

        info!(key, run_id = %guard.run_id(), removed, added, total, "Sync complete");

        Ok(SyncReport {
            key: key.to_string(),
            run_id: guard.run_id(),
            sources,
            removed,
            added,
            total,
        })
    }

    /// Read every source file. A malformed file is skipped so that one bad
    /// source does not block the rest; its previous descriptors stay indexed.
    async fn load_every_source(
        &self,
    ) -> apiforge_core::Result<Vec<(String, Vec<ResourceDescriptor>)>> {
        let store = &self.inner.store;
        let mut loaded = Vec::new();

        for source in store.list_sources().await? {
            match store.load(&source).await {
                Ok(descriptors) => loaded.push((source, descriptors)),
                Err(e) => warn!(source = %source, error = %e, "Skipping unreadable source"),
            }
        }

        Ok(loaded)
    }

    /// The usage report for the current descriptor set.
    ///
    /// The project is rescanned when `force` is set or when descriptors have
    /// changed since the last scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot run.
    pub async fn usage_report(&self, force: bool) -> apiforge_core::Result<Arc<UsageReport>> {
        let (descriptors, generation) = {
            let search = self.inner.search.read().await;
            (search.descriptors(), search.generation())
        };

        let mut usage = self.inner.usage.lock().await;
        if !force {
            if let Some(report) = usage.report().filter(|r| !r.is_stale(generation)) {
                return Ok(report);
            }
        }

        Ok(usage.reindex(&descriptors, generation).await?)
    }
}
