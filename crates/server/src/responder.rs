//! Default response computation: metadata, redirects and binaries.

use async_trait::async_trait;
use serde_json::Value;

use disscache_client::BlobCache;
use disscache_core::{CachedResponse, ComputeError, ComputeResponse, Error, ResourceSnapshot};

pub const NTRIPLES: &str = "application/n-triples";

/// Answers a request from the resource snapshot.
///
/// Recognised parameters:
/// - `redirect: true` redirects to the canonical resource URI
/// - `binary: true` serves the resource's binary from the blob cache,
///   optionally checked against `content_type`
///
/// Anything else returns the metadata as N-Triples.
#[derive(Debug, Clone)]
pub struct MetadataResponder {
    blobs: BlobCache,
}

impl MetadataResponder {
    pub fn new(blobs: BlobCache) -> Self {
        Self { blobs }
    }
}

fn flag(params: &Value, name: &str) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(false)
}

/// A missing binary is an answer about the resource; anything else went
/// wrong on our side or upstream and must not be cached.
fn blob_failure(uri: &str, err: Error) -> ComputeError {
    match err {
        Error::NoBinaryContent(_) => ComputeError::new(err.status_code(), err.to_string()),
        other => {
            tracing::warn!(uri, error = %other, "binary unavailable");
            ComputeError::new(500, other.to_string())
        }
    }
}

#[async_trait]
impl ComputeResponse for MetadataResponder {
    async fn compute(&self, snapshot: &mut ResourceSnapshot, params: &Value) -> Result<CachedResponse, ComputeError> {
        if flag(params, "redirect") {
            return Ok(CachedResponse::new(Vec::new(), 302).with_header("Location", snapshot.uri.as_str()));
        }

        if flag(params, "binary") {
            let expected = params.get("content_type").and_then(Value::as_str);
            let path = self
                .blobs
                .resolve_reference(&snapshot.uri, expected)
                .await
                .map_err(|e| blob_failure(&snapshot.uri, e))?;
            let mut response = CachedResponse::file(path, 200);
            if let Some(content_type) = expected {
                response = response.with_header("Content-Type", content_type);
            }
            return Ok(response);
        }

        Ok(CachedResponse::new(snapshot.metadata.as_bytes(), 200).with_header("Content-Type", NTRIPLES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disscache_core::config::LocalAccess;
    use disscache_core::response::Body;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn responder(local: &std::path::Path, cache: &std::path::Path) -> MetadataResponder {
        let mut access = BTreeMap::new();
        access.insert("https://repo/api/".to_string(), LocalAccess { dir: local.to_path_buf(), level: 2 });
        let http = disscache_client::http_client("test", Duration::from_secs(1), 0).unwrap();
        MetadataResponder::new(BlobCache::new(cache, access, http))
    }

    #[tokio::test]
    async fn test_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let r = responder(tmp.path(), tmp.path());
        let mut snapshot = ResourceSnapshot::new("https://repo/api/1", "<a> <b> <c> .\n");

        let resp = r.compute(&mut snapshot, &json!({})).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, Body::Inline(b"<a> <b> <c> .\n".to_vec()));
        assert_eq!(resp.headers["Content-Type"].values(), [NTRIPLES]);
    }

    #[tokio::test]
    async fn test_redirect() {
        let tmp = tempfile::tempdir().unwrap();
        let r = responder(tmp.path(), tmp.path());
        let mut snapshot = ResourceSnapshot::new("https://repo/api/1", "");

        let resp = r.compute(&mut snapshot, &json!({"redirect": true})).await.unwrap();
        assert_eq!(resp.status, 302);
        assert_eq!(resp.headers["Location"].values(), ["https://repo/api/1"]);
    }

    #[tokio::test]
    async fn test_local_binary() {
        let local = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let path = disscache_client::blob::shard_path(local.path(), 2, 1234);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"binary").unwrap();

        let r = responder(local.path(), cache.path());
        let mut snapshot = ResourceSnapshot::new("https://repo/api/1234", "");
        let resp = r
            .compute(&mut snapshot, &json!({"binary": true, "content_type": "image/png"}))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, Body::File(path));
        assert_eq!(resp.headers["Content-Type"].values(), ["image/png"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_404() {
        let local = tempfile::tempdir().unwrap();
        let r = responder(local.path(), local.path());
        let mut snapshot = ResourceSnapshot::new("https://repo/api/99", "");

        let err = r.compute(&mut snapshot, &json!({"binary": true})).await.unwrap_err();
        assert_eq!(err.status, 404);
        assert!(err.message.starts_with("NO_BINARY"));
    }

    #[tokio::test]
    async fn test_unreachable_source_is_server_error() {
        let tmp = tempfile::tempdir().unwrap();
        let r = responder(tmp.path(), tmp.path());
        let mut snapshot = ResourceSnapshot::new("http://127.0.0.1:1/api/5", "");

        let err = r.compute(&mut snapshot, &json!({"binary": true})).await.unwrap_err();
        assert_eq!(err.status, 500);
        assert!(err.is_server_error());
    }
}
