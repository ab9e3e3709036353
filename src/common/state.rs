use moka::future::Cache;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::error::AppResult;
use crate::genai::GenAiClient;
use crate::metoffice::MetOfficeClient;
use crate::storage::StorageClient;

/// Rendered dashboard pages keyed by data generation.
///
/// Ingestion bumps the generation, so a page built from reads taken before a
/// write is stored under a generation no later lookup asks for.
#[derive(Clone)]
pub struct DashboardCache {
    pages: Cache<u64, Arc<String>>,
    generation: Arc<AtomicU64>,
}

impl DashboardCache {
    #[must_use]
    pub fn new(ttl_seconds: u64) -> Self {
        // A zero TTL turns the cache off
        let capacity = if ttl_seconds == 0 { 0 } else { 4 };
        Self {
            pages: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(Duration::from_secs(ttl_seconds.max(1)))
                .build(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Generation to read before building a page.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Page for the current generation, if cached.
    pub async fn current(&self) -> Option<Arc<String>> {
        self.pages.get(&self.generation()).await
    }

    /// Store a page built at `generation`. Outdated pages are dropped.
    pub async fn store(&self, generation: u64, page: Arc<String>) {
        if generation == self.generation() {
            self.pages.insert(generation, page).await;
        }
    }

    /// Called after every successful write.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.pages.invalidate_all();
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub genai: Arc<GenAiClient>,
    pub met_office: Arc<MetOfficeClient>,
    pub storage: Arc<StorageClient>,
    pub dashboard_cache: DashboardCache,
}

impl AppState {
    /// # Errors
    ///
    /// Returns `AppError::Internal` if an outbound HTTP client cannot be built.
    pub fn new(db: DatabaseConnection, config: Config) -> AppResult<Self> {
        let dashboard_cache = DashboardCache::new(config.dashboard_cache_seconds);

        Ok(Self {
            genai: Arc::new(GenAiClient::new(&config)?),
            met_office: Arc::new(MetOfficeClient::new(&config)?),
            storage: Arc::new(StorageClient::new(&config)?),
            db,
            config: Arc::new(config),
            dashboard_cache,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn page_built_before_a_write_is_not_served() {
        let cache = DashboardCache::new(60);

        let before = cache.generation();
        cache.invalidate();
        cache.store(before, Arc::new("stale".to_string())).await;
        assert!(cache.current().await.is_none());

        let now = cache.generation();
        cache.store(now, Arc::new("fresh".to_string())).await;
        assert_eq!(cache.current().await.as_deref().map(String::as_str), Some("fresh"));

        cache.invalidate();
        assert!(cache.current().await.is_none());
    }
}
