//! TTL-bounded, background-refreshed schema cache (SPEC_FULL.md §4.5).
//! Multiple concurrent readers share a snapshot; a writer replaces a whole
//! slot atomically so no reader ever observes a partially-populated
//! `TableDetail`. Modeled on the "independent task, no lock held across a
//! suspension point" rule in §5 — the cache releases its lock before
//! calling the provider and reacquires it only to insert the fresh entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

use super::{TableDetail, TableSummary};

/// The introspection surface the cache depends on. `Connector` implements
/// this; tests substitute a fake.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn list_tables(&self) -> anyhow::Result<Vec<TableSummary>>;
    async fn describe_table(&self, name: &str) -> anyhow::Result<TableDetail>;
}

struct CacheEntry {
    detail: TableDetail,
    fetched_at: Instant,
}

struct Inner {
    tables: Option<(Vec<TableSummary>, Instant)>,
    details: HashMap<String, CacheEntry>,
}

pub struct SchemaCache {
    provider: Arc<dyn SchemaProvider>,
    ttl: Duration,
    max_tables: usize,
    inner: RwLock<Inner>,
    stop: watch::Sender<bool>,
}

impl SchemaCache {
    pub fn new(provider: Arc<dyn SchemaProvider>, ttl: Duration, max_tables: usize) -> Arc<Self> {
        let (stop, _) = watch::channel(false);
        Arc::new(SchemaCache {
            provider,
            ttl,
            max_tables,
            inner: RwLock::new(Inner {
                tables: None,
                details: HashMap::new(),
            }),
            stop,
        })
    }

    pub async fn list_tables(&self) -> anyhow::Result<Vec<TableSummary>> {
        {
            let guard = self.inner.read().await;
            if let Some((tables, fetched_at)) = &guard.tables {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(tables.clone());
                }
            }
        }
        let fresh = self.provider.list_tables().await?;
        let mut guard = self.inner.write().await;
        guard.tables = Some((fresh.clone(), Instant::now()));
        Ok(fresh)
    }

    pub async fn describe_table(&self, name: &str) -> anyhow::Result<TableDetail> {
        {
            let guard = self.inner.read().await;
            if let Some(entry) = guard.details.get(name) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.detail.clone());
                }
            }
        }
        let detail = self.provider.describe_table(name).await?;
        self.insert_detail(name.to_string(), detail.clone()).await;
        Ok(detail)
    }

    async fn insert_detail(&self, name: String, detail: TableDetail) {
        let mut guard = self.inner.write().await;
        if self.max_tables > 0 && guard.details.len() >= self.max_tables && !guard.details.contains_key(&name) {
            if let Some(oldest) = guard
                .details
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| k.clone())
            {
                guard.details.remove(&oldest);
            }
        }
        guard.details.insert(
            name,
            CacheEntry {
                detail,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Re-fetch the table list, then refresh every known detail. Individual
    /// failures are logged and skipped; the cache keeps last-good values.
    pub async fn refresh(&self) {
        match self.provider.list_tables().await {
            Ok(tables) => {
                let mut guard = self.inner.write().await;
                guard.tables = Some((tables, Instant::now()));
            }
            Err(e) => warn!(error = %e, "schema refresh: list_tables failed, keeping stale cache"),
        }

        let names: Vec<String> = {
            let guard = self.inner.read().await;
            guard.details.keys().cloned().collect()
        };
        for name in names {
            match self.provider.describe_table(&name).await {
                Ok(detail) => self.insert_detail(name, detail).await,
                Err(e) => warn!(table = %name, error = %e, "schema refresh: describe_table failed"),
            }
        }
    }

    pub async fn invalidate(&self, name: &str) {
        let mut guard = self.inner.write().await;
        guard.details.remove(name);
    }

    pub async fn invalidate_all(&self) {
        let mut guard = self.inner.write().await;
        guard.tables = None;
        guard.details.clear();
    }

    /// Spawn the periodic background refresh task. Returns a handle whose
    /// `stop()` joins the task (SPEC_FULL.md §1.2 graceful shutdown).
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> CacheHandle {
        let cache = Arc::clone(self);
        let mut stop_rx = self.stop.subscribe();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("background schema refresh tick");
                        cache.refresh().await;
                    }
                    _ = stop_rx.changed() => {
                        debug!("background schema refresh stopping");
                        break;
                    }
                }
            }
        });
        CacheHandle {
            task,
            stop: self.stop.clone(),
        }
    }
}

pub struct CacheHandle {
    task: tokio::task::JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl CacheHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::LogicalType;
    use crate::schema::{ColumnInfo, TableKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SchemaProvider for CountingProvider {
        async fn list_tables(&self) -> anyhow::Result<Vec<TableSummary>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![TableSummary {
                name: "users".into(),
                kind: TableKind::Table,
                row_count: 10,
            }])
        }

        async fn describe_table(&self, name: &str) -> anyhow::Result<TableDetail> {
            Ok(TableDetail {
                name: name.to_string(),
                schema: "public".into(),
                columns: vec![ColumnInfo {
                    name: "id".into(),
                    logical_type: LogicalType::Integer,
                    nullable: false,
                    pk: true,
                    fk: None,
                    default: None,
                }],
                primary_key: vec!["id".into()],
                foreign_keys: vec![],
                indexes: vec![],
                row_count: 10,
                description: None,
            })
        }
    }

    #[tokio::test]
    async fn list_tables_is_cached_within_ttl() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = SchemaCache::new(provider.clone(), Duration::from_secs(60), 0);
        cache.list_tables().await.unwrap();
        cache.list_tables().await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eviction_drops_oldest_entry_when_max_tables_reached() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = SchemaCache::new(provider, Duration::from_secs(60), 1);
        cache.describe_table("users").await.unwrap();
        cache.insert_detail(
            "orders".to_string(),
            TableDetail {
                name: "orders".into(),
                schema: "public".into(),
                columns: vec![],
                primary_key: vec![],
                foreign_keys: vec![],
                indexes: vec![],
                row_count: 0,
                description: None,
            },
        ).await;
        let guard = cache.inner.read().await;
        assert_eq!(guard.details.len(), 1);
        assert!(guard.details.contains_key("orders"));
    }
}
