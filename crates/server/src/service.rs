//! Request handling on top of the response cache.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use disscache_client::{BlobCache, HttpProvider, ProviderConfig};
use disscache_core::{AppConfig, CacheDb, CachedResponse, Error, ResponseCache};

use crate::error::ServiceError;
use crate::responder::MetadataResponder;

const INTERNAL_ERROR_BODY: &str = "Internal Server Error\n";

/// Answers requests for resource identifiers.
///
/// Every request yields a response: failures are turned into error
/// responses, and those caused by the compute step are cached like any
/// other response.
#[derive(Debug, Clone)]
pub struct Service {
    config: Arc<AppConfig>,
    cache: ResponseCache,
}

impl Service {
    pub fn new(config: AppConfig, cache: ResponseCache) -> Self {
        Self { config: Arc::new(config), cache }
    }

    /// Wire the store, the repository provider and the blob cache together.
    pub async fn from_config(config: AppConfig, blobs: BlobCache) -> Result<Self, Error> {
        let db = CacheDb::open(&config.db_path).await?;
        let provider = HttpProvider::new(ProviderConfig::from(&config))?;
        let cache = ResponseCache::new(db, MetadataResponder::new(blobs), config.ttl.to_cache_ttl())
            .with_provider(Arc::new(provider))
            .with_search_config(config.search.clone());
        Ok(Self::new(config, cache))
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Response for resource `id` under `params`.
    ///
    /// With `clear_cache` set every response cached for the resource is
    /// dropped first.
    pub async fn serve_request(&self, id: &str, params: &Value, clear_cache: bool) -> CachedResponse {
        let started = Instant::now();
        tracing::info!(id, "getting response");

        let response = match self.try_serve(id, params, clear_cache).await {
            Ok(response) => response,
            Err(err) => self.error_response(err).await,
        };

        tracing::info!(
            id,
            status = response.status,
            hit = response.hit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response ready"
        );
        response
    }

    async fn try_serve(&self, id: &str, params: &Value, clear_cache: bool) -> Result<CachedResponse, ServiceError> {
        if id.is_empty() {
            return Err(ServiceError::rejected(400, "no identifier provided"));
        }
        if !self.config.is_allowed(id) {
            return Err(ServiceError::rejected(400, format!("Requested resource {id} not in allowed namespace")));
        }

        if clear_cache {
            let removed = self.cache.prune_for_resource(id).await?;
            tracing::info!(id, removed, "cleared cached responses");
        }

        Ok(self.cache.get_response(params, id).await?)
    }

    async fn error_response(&self, err: ServiceError) -> CachedResponse {
        let status = err.status_code();
        let body = if err.is_ordinary() {
            tracing::info!(status, error = %err, "request failed");
            format!("{}\n", err.client_message())
        } else {
            tracing::error!(status, error = %err, "request failed");
            INTERNAL_ERROR_BODY.to_string()
        };
        let response = CachedResponse::new(body, status);

        if let Some(key) = err.response_key()
            && let Err(e) = self.cache.store_response(key, &response).await
        {
            tracing::warn!(key, error = %e, "failed to cache error response");
        }
        response
    }
}
