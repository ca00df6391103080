//! Fixtures shared by the server tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use disscache_core::response::Body;
use disscache_core::{
    AppConfig, CacheDb, CacheTtl, CachedResponse, ComputeError, ComputeResponse, Error, ResourceProvider,
    ResourceSnapshot, ResponseCache, SearchConfig,
};

use crate::service::Service;

/// Knows `https://repo/api/1` only.
pub struct StaticProvider;

#[async_trait]
impl ResourceProvider for StaticProvider {
    async fn get_resource_by_id(&self, id: &str, _search: &SearchConfig) -> Result<ResourceSnapshot, Error> {
        match id {
            "https://repo/api/1" => Ok(ResourceSnapshot::new(id, "<s> <p> <o> .")),
            _ => Err(Error::NotFound(format!("{id} can not be resolved (HTTP status code 404)"))),
        }
    }

    async fn get_modification_timestamp(&self, _id: &str) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(None)
    }
}

/// Knows every identifier, as a resource without metadata.
pub struct EchoProvider;

#[async_trait]
impl ResourceProvider for EchoProvider {
    async fn get_resource_by_id(&self, id: &str, _search: &SearchConfig) -> Result<ResourceSnapshot, Error> {
        Ok(ResourceSnapshot::new(id, ""))
    }

    async fn get_modification_timestamp(&self, _id: &str) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(None)
    }
}

/// Echoes the metadata; `fail` and `crash` parameters trigger errors, `file`
/// answers with that file.
pub struct Counting {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ComputeResponse for Counting {
    async fn compute(&self, snapshot: &mut ResourceSnapshot, params: &Value) -> Result<CachedResponse, ComputeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if params.get("fail").is_some() {
            return Err(ComputeError::new(422, "unsupported format"));
        }
        if params.get("crash").is_some() {
            return Err(ComputeError::new(503, "backend exploded"));
        }
        if let Some(path) = params.get("file").and_then(Value::as_str) {
            return Ok(CachedResponse::file(path, 200));
        }
        Ok(CachedResponse::new(snapshot.metadata.clone(), 200).with_header("Content-Type", "application/n-triples"))
    }
}

/// Service over an in-memory store, with a counter of compute calls.
pub async fn service() -> (Service, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let db = CacheDb::open_in_memory().await.unwrap();
    let ttl = CacheTtl::new(Duration::seconds(60), Duration::seconds(60));
    let cache = ResponseCache::new(db, Counting { calls: calls.clone() }, ttl).with_provider(Arc::new(StaticProvider));
    let config = AppConfig { allowed_namespaces: vec!["https://repo/api/".into()], ..Default::default() };
    (Service::new(config, cache), calls)
}

pub fn body(resp: &CachedResponse) -> &[u8] {
    match &resp.body {
        Body::Inline(bytes) => bytes,
        Body::File(_) => panic!("unexpected file body"),
    }
}

/// Text of the first content item of a tool result.
pub fn result_text(result: &rmcp::model::CallToolResult) -> String {
    let content = serde_json::to_value(&result.content[0]).unwrap();
    content.get("text").and_then(|v| v.as_str()).expect("text content").to_string()
}
