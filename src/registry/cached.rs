//! Snapshot-serving registry with background refresh.
//!
//! Lookups read an immutable snapshot behind a `tokio::sync::RwLock`; refresh
//! builds a new snapshot off to the side and swaps it in. A snapshot older than
//! the refresh interval triggers one inline reload. If the store is down, the
//! previous snapshot keeps serving until it exceeds the maximum staleness,
//! after which lookups fail with `RegistryUnavailable`. After a failed reload
//! no further inline attempt is made for one refresh interval while a usable
//! snapshot remains.

use super::{RegistryStore, TenantRegistry, TenantRegistryEntry, sorted_active};
use crate::config::TenancyConfig;
use crate::error::{TenancyError, TenancyResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

type EntryMap = HashMap<String, TenantRegistryEntry>;

#[derive(Debug, Clone)]
struct Snapshot {
    entries: Arc<EntryMap>,
    loaded_at: Instant,
}

impl Snapshot {
    fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }
}

struct Shared<S> {
    store: S,
    snapshot: RwLock<Option<Snapshot>>,
    // serialises inline reloads
    reload_lock: Mutex<()>,
    // set after a failed reload; inline reloads wait until then
    retry_at: RwLock<Option<Instant>>,
    refresh_interval: Duration,
    max_staleness: Duration,
}

impl<S: RegistryStore> Shared<S> {
    async fn reload(&self) -> TenancyResult<Arc<EntryMap>> {
        let rows = match self.store.load_all().await {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Registry store load failed: {}", e);
                *self.retry_at.write().await = Some(Instant::now() + self.refresh_interval);
                return Err(TenancyError::registry_unavailable(e.to_string()));
            }
        };

        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            match row.validate() {
                Ok(entry) => {
                    entries.insert(entry.tenant_id().to_string(), entry);
                }
                Err(e) => log::warn!("Skipping registry row: {}", e),
            }
        }

        let entries = Arc::new(entries);
        *self.snapshot.write().await = Some(Snapshot {
            entries: Arc::clone(&entries),
            loaded_at: Instant::now(),
        });
        *self.retry_at.write().await = None;
        log::debug!("Registry snapshot refreshed: {} tenants", entries.len());
        Ok(entries)
    }

    /// Entries that can be served without touching the store: a fresh
    /// snapshot, or a stale one within bounds while a failed reload backs off.
    async fn servable_entries(&self) -> Option<Arc<EntryMap>> {
        let snapshot = self.snapshot.read().await;
        let snapshot = snapshot.as_ref()?;
        let age = snapshot.age();
        if age < self.refresh_interval {
            return Some(Arc::clone(&snapshot.entries));
        }

        let backing_off = self
            .retry_at
            .read()
            .await
            .is_some_and(|at| Instant::now() < at);
        if backing_off && age <= self.max_staleness {
            log::debug!("Registry store backing off; serving snapshot {}s old", age.as_secs());
            return Some(Arc::clone(&snapshot.entries));
        }
        None
    }

    async fn entries(&self) -> TenancyResult<Arc<EntryMap>> {
        if let Some(entries) = self.servable_entries().await {
            return Ok(entries);
        }

        let _reloading = self.reload_lock.lock().await;
        // another caller may have reloaded, or failed, while we waited
        if let Some(entries) = self.servable_entries().await {
            return Ok(entries);
        }

        match self.reload().await {
            Ok(entries) => Ok(entries),
            Err(error) => {
                let last = self.snapshot.read().await.clone();
                match last {
                    Some(snapshot) if snapshot.age() <= self.max_staleness => {
                        log::warn!(
                            "Serving registry snapshot {}s old while the store is unavailable",
                            snapshot.age().as_secs()
                        );
                        Ok(snapshot.entries)
                    }
                    _ => {
                        log::error!("Registry unavailable and no usable snapshot: {}", error);
                        Err(error)
                    }
                }
            }
        }
    }
}

/// [`TenantRegistry`] serving lookups from a periodically refreshed snapshot.
///
/// Cloning is cheap; clones share the snapshot.
pub struct CachedTenantRegistry<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for CachedTenantRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for CachedTenantRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTenantRegistry")
            .field("refresh_interval", &self.shared.refresh_interval)
            .field("max_staleness", &self.shared.max_staleness)
            .finish_non_exhaustive()
    }
}

impl<S: RegistryStore> CachedTenantRegistry<S> {
    /// Wrap `store` using the refresh timing from `config`.
    ///
    /// Nothing is loaded until the first lookup or [`refresh`](Self::refresh).
    pub fn new(store: S, config: &TenancyConfig) -> Self {
        Self::with_timing(
            store,
            config.registry_refresh_interval(),
            config.registry_max_staleness(),
        )
    }

    pub fn with_timing(store: S, refresh_interval: Duration, max_staleness: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                snapshot: RwLock::new(None),
                reload_lock: Mutex::new(()),
                retry_at: RwLock::new(None),
                refresh_interval,
                max_staleness,
            }),
        }
    }

    /// Wrap `store` and load the first snapshot, failing if the store is down.
    pub async fn load(store: S, config: &TenancyConfig) -> TenancyResult<Self> {
        let registry = Self::new(store, config);
        registry.refresh().await?;
        Ok(registry)
    }

    /// Reload from the store now, returning the number of usable entries.
    pub async fn refresh(&self) -> TenancyResult<usize> {
        let _reloading = self.shared.reload_lock.lock().await;
        self.shared.reload().await.map(|entries| entries.len())
    }

    /// Age of the current snapshot, if one has been loaded.
    pub async fn snapshot_age(&self) -> Option<Duration> {
        self.shared.snapshot.read().await.as_ref().map(Snapshot::age)
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    pub fn refresh_interval(&self) -> Duration {
        self.shared.refresh_interval
    }
}

impl<S: RegistryStore + 'static> CachedTenantRegistry<S> {
    /// Refresh the snapshot every refresh interval on a background task.
    ///
    /// Failures are logged and retried on the next tick. The task stops when
    /// the returned handle is dropped or every registry clone is gone.
    pub fn spawn_refresh(&self) -> RefreshTask {
        let shared = Arc::downgrade(&self.shared);
        let period = self.shared.refresh_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    log::debug!("Registry dropped; stopping background refresh");
                    break;
                };
                let _reloading = shared.reload_lock.lock().await;
                if let Err(e) = shared.reload().await {
                    log::warn!(
                        "Background registry refresh failed, retrying in {:?}: {}",
                        period,
                        e
                    );
                }
            }
        });

        RefreshTask { handle }
    }
}

impl<S: RegistryStore> TenantRegistry for CachedTenantRegistry<S> {
    async fn lookup(&self, tenant_id: &str) -> TenancyResult<Option<TenantRegistryEntry>> {
        Ok(self.shared.entries().await?.get(tenant_id).cloned())
    }

    async fn list_active(&self) -> TenancyResult<Vec<TenantRegistryEntry>> {
        Ok(sorted_active(self.shared.entries().await?.values()))
    }
}

/// Handle to the background refresh task; aborts the task on drop.
#[derive(Debug)]
pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
