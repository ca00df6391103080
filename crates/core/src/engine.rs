//! Two-level response cache in front of slow resource providers.
//!
//! Resource snapshots are kept fresh against the providers' modification
//! timestamps; computed responses are cached per `(resource, params)` pair
//! on top of them.
//!
//! Freshness is decided on two horizons. Within the soft TTL a stored
//! snapshot is trusted without asking anyone. Past it, providers are asked
//! for the resource's modification time and the snapshot is dropped when
//! the source is newer or when its age reaches the hard TTL.

use crate::cache::{CacheDb, CacheEntry, compute_response_key, response_key_pattern};
use crate::error::ComputeError;
use crate::response::CachedResponse;
use crate::snapshot::{ResourceSnapshot, SearchConfig};
use crate::Error;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Factor applied to the soft resource TTL when no hard TTL is configured.
pub const HARD_TTL_MULTIPLIER: i32 = 10;

/// Authoritative source of resource descriptions.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Fetch the current snapshot of `id`.
    ///
    /// Fails with [`Error::NotFound`] when the provider does not know `id`.
    async fn get_resource_by_id(&self, id: &str, search: &SearchConfig) -> Result<ResourceSnapshot, Error>;

    /// Last modification time of `id` at the source.
    ///
    /// `Ok(None)` means unknown: the snapshot is never considered outdated on
    /// this signal alone.
    async fn get_modification_timestamp(&self, id: &str) -> Result<Option<DateTime<Utc>>, Error>;
}

/// Turns a resource snapshot and request parameters into a response.
///
/// Identifiers added to the snapshot are persisted along with it.
#[async_trait]
pub trait ComputeResponse: Send + Sync {
    async fn compute(&self, snapshot: &mut ResourceSnapshot, params: &Value) -> Result<CachedResponse, ComputeError>;
}

#[async_trait]
impl<F> ComputeResponse for F
where
    F: Fn(&mut ResourceSnapshot, &Value) -> Result<CachedResponse, ComputeError> + Send + Sync,
{
    async fn compute(&self, snapshot: &mut ResourceSnapshot, params: &Value) -> Result<CachedResponse, ComputeError> {
        self(snapshot, params)
    }
}

/// Cache lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    /// Age after which a snapshot is revalidated against its source.
    pub resource: Duration,
    /// Age after which a snapshot is dropped whatever the source says.
    pub hard_resource: Duration,
    /// Age after which a computed response is recomputed.
    pub response: Duration,
}

impl CacheTtl {
    pub fn new(resource: Duration, response: Duration) -> Self {
        let hard_resource = resource.checked_mul(HARD_TTL_MULTIPLIER).unwrap_or(Duration::MAX);
        Self { resource, hard_resource, response }
    }

    pub fn with_hard_resource(mut self, hard_resource: Duration) -> Self {
        self.hard_resource = hard_resource;
        self
    }
}

/// Outcome of asking providers for a modification time.
#[derive(Debug, Default)]
struct Revalidation {
    /// Index of the first provider reporting a known timestamp.
    provider: Option<usize>,
    modified: Option<DateTime<Utc>>,
}

/// The response cache.
///
/// Cloning is cheap; clones share the store, providers and compute function.
#[derive(Clone)]
pub struct ResponseCache {
    db: CacheDb,
    providers: Vec<Arc<dyn ResourceProvider>>,
    compute: Arc<dyn ComputeResponse>,
    ttl: CacheTtl,
    search: SearchConfig,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("providers", &self.providers.len())
            .field("ttl", &self.ttl)
            .field("search", &self.search)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    pub fn new(db: CacheDb, compute: impl ComputeResponse + 'static, ttl: CacheTtl) -> Self {
        Self { db, providers: Vec::new(), compute: Arc::new(compute), ttl, search: SearchConfig::default() }
    }

    /// Append a provider. Providers are consulted in insertion order.
    pub fn with_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_search_config(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn ttl(&self) -> CacheTtl {
        self.ttl
    }

    /// Response for `params` against the resource known as `res_id`.
    ///
    /// Served from the store when both the snapshot and the response are
    /// fresh (`hit` set), computed otherwise. A compute failure is reported
    /// as [`Error::Compute`] carrying the response key it would have been
    /// stored under; the fetched snapshot is persisted regardless.
    pub async fn get_response(&self, params: &Value, res_id: &str) -> Result<CachedResponse, Error> {
        let now = Utc::now();
        let mut revalidation = Revalidation::default();
        let mut stale_entry_id = None;
        let mut snapshot = None;

        if let Some(entry) = self.db.get(res_id).await? {
            let age = entry.age(now);
            if age < self.ttl.resource {
                tracing::debug!(res_id, age_secs = age.num_seconds(), "snapshot within resource ttl");
                snapshot = decode_snapshot(&entry);
            } else {
                revalidation = self.revalidate(res_id).await?;
                let outdated = revalidation.modified.is_some_and(|modified| modified > entry.created);
                let expired = age >= self.ttl.hard_resource;
                tracing::debug!(
                    res_id,
                    age_secs = age.num_seconds(),
                    modified = ?revalidation.modified,
                    outdated,
                    expired,
                    "snapshot revalidated"
                );
                if outdated || expired {
                    tracing::info!(res_id, outdated, expired, "dropping cached snapshot");
                } else {
                    snapshot = decode_snapshot(&entry);
                }
            }
            if snapshot.is_none() {
                stale_entry_id = Some(entry.id);
            }
        }

        if let Some(cached) = &snapshot {
            let response_key = compute_response_key(params, &cached.uri);
            if let Some(response) = self.cached_response(&response_key, now).await? {
                tracing::info!(res_id, key = %response_key, "serving response from cache");
                return Ok(response);
            }
        }

        let mut snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                let mut fetched = self.fetch(res_id, revalidation.provider).await?;
                fetched.add_id(res_id);
                fetched
            }
        };
        // keyed by the canonical uri, whatever identifier was requested
        let response_key = compute_response_key(params, &snapshot.uri);

        tracing::info!(res_id, key = %response_key, "computing response");
        let result = self.compute.compute(&mut snapshot, params).await;

        if let Ok(response) = &result {
            self.store_response(&response_key, response).await?;
        }

        if !snapshot.is_from_store() {
            let keys = snapshot.keys();
            tracing::info!(uri = %snapshot.uri, ids = keys.len(), "caching snapshot");
            self.db.set(keys, snapshot.serialize()?, stale_entry_id).await?;
        }

        match result {
            Ok(mut response) => {
                response.hit = false;
                Ok(response)
            }
            Err(error) => Err(Error::Compute { response_key, error }),
        }
    }

    /// Store `response` under `response_key`, overwriting any previous one
    /// in place.
    ///
    /// Exposed so callers can cache responses built outside the compute
    /// function, e.g. error responses.
    pub async fn store_response(&self, response_key: &str, response: &CachedResponse) -> Result<i64, Error> {
        tracing::info!(key = %response_key, status = response.status, "caching response");
        let previous = self.db.get(response_key).await?.map(|entry| entry.id);
        self.db.set([response_key], response.serialize()?.into_bytes(), previous).await
    }

    /// Drop every cached response of the resource known as `res_id`.
    ///
    /// Covers all identifiers the stored snapshot is aliased under; the
    /// snapshot itself is kept. Returns the number of responses removed.
    pub async fn prune_for_resource(&self, res_id: &str) -> Result<u64, Error> {
        let mut keys = self.db.keys(res_id).await?;
        if keys.is_empty() {
            keys.push(res_id.to_string());
        }

        let mut removed = 0;
        for key in &keys {
            removed += self.db.delete_by_key_pattern(&response_key_pattern(key)).await?;
        }

        tracing::info!(res_id, identifiers = keys.len(), removed, "pruned cached responses");
        Ok(removed)
    }

    async fn cached_response(&self, response_key: &str, now: DateTime<Utc>) -> Result<Option<CachedResponse>, Error> {
        let Some(entry) = self.db.get(response_key).await? else {
            return Ok(None);
        };

        let age = entry.age(now);
        if age >= self.ttl.response {
            tracing::debug!(key = %response_key, age_secs = age.num_seconds(), "cached response expired");
            return Ok(None);
        }

        let decoded = String::from_utf8(entry.value)
            .map_err(|e| Error::CorruptEntry(format!("response {response_key}: {e}")))
            .and_then(|data| CachedResponse::deserialize(&data));
        let response = match decoded {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(key = %response_key, error = %e, "discarding undecodable response");
                return Ok(None);
            }
        };

        if !response.body_available() {
            tracing::debug!(key = %response_key, "cached response file is gone");
            return Ok(None);
        }
        Ok(Some(response))
    }

    async fn revalidate(&self, res_id: &str) -> Result<Revalidation, Error> {
        for (idx, provider) in self.providers.iter().enumerate() {
            match provider.get_modification_timestamp(res_id).await {
                Ok(Some(modified)) => return Ok(Revalidation { provider: Some(idx), modified: Some(modified) }),
                Ok(None) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Revalidation::default())
    }

    async fn fetch(&self, res_id: &str, responsible: Option<usize>) -> Result<ResourceSnapshot, Error> {
        let candidates = responsible
            .and_then(|idx| self.providers.get(idx..=idx))
            .unwrap_or(self.providers.as_slice());

        let mut reason = None;
        for provider in candidates {
            match provider.get_resource_by_id(res_id, &self.search).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(Error::NotFound(msg)) => reason = Some(msg),
                Err(e) => return Err(e),
            }
        }

        tracing::info!(res_id, providers = candidates.len(), "resource not found");
        // report the last provider's explanation
        Err(Error::NotFound(reason.unwrap_or_else(|| res_id.to_string())))
    }
}

fn decode_snapshot(entry: &CacheEntry) -> Option<ResourceSnapshot> {
    match ResourceSnapshot::deserialize(&entry.value) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(entry = entry.id, error = %e, "discarding undecodable snapshot");
            None
        }
    }
}
