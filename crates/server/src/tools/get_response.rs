//! get_response tool implementation.
//!
//! Serves the cached response for a resource, computing it when needed.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use disscache_core::response::{Body, BufferedSink};

use crate::service::Service;

/// Largest file body returned inline. The whole body is held in memory and
/// base64 encoded, so bigger files are only referenced by path.
pub const MAX_INLINE_FILE_BYTES: u64 = 16 * 1024 * 1024;

/// Parameters for the get_response tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetResponseParams {
    /// Resource identifier (any of its aliases).
    pub id: String,

    /// Request parameters; responses are cached per distinct value.
    #[serde(default)]
    pub params: Option<Value>,

    /// Drop every cached response of the resource first.
    #[serde(default)]
    pub clear_cache: bool,

    /// Accept-Encoding of the client; enables gzip/deflate compression.
    pub accept_encoding: Option<String>,
}

/// One header line of the response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HeaderOutput {
    pub name: String,
    pub value: String,
}

/// Output from the get_response tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetResponseOutput {
    pub status: u16,
    pub headers: Vec<HeaderOutput>,

    /// Body as text, or base64 when `body_encoding` says so.
    pub body: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<String>,

    /// Path of a file body too large to inline; `body` is empty then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_file: Option<String>,

    /// Compression applied to the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,

    /// Whether the response came from the cache.
    pub hit: bool,
}

/// Implementation of the get_response tool.
pub async fn get_response_impl(service: &Service, params: GetResponseParams) -> Result<CallToolResult, McpError> {
    let request = params.params.unwrap_or_else(|| Value::Object(Default::default()));
    let response = service.serve_request(&params.id, &request, params.clear_cache).await;

    let hit = response.hit;
    if let Body::File(path) = &response.body
        && let Ok(meta) = std::fs::metadata(path)
        && meta.len() > MAX_INLINE_FILE_BYTES
    {
        tracing::info!(path = %path.display(), size = meta.len(), "file body too large to inline");
        let output = GetResponseOutput {
            status: response.status,
            headers: response
                .headers
                .iter()
                .flat_map(|(name, value)| {
                    value.values().iter().map(move |v| HeaderOutput { name: name.clone(), value: v.clone() })
                })
                .collect(),
            body: String::new(),
            body_encoding: None,
            body_file: Some(path.display().to_string()),
            content_encoding: None,
            hit,
        };
        return super::json_result(&output);
    }

    let accept_encoding = params.accept_encoding;
    let (sink, encoding) = tokio::task::spawn_blocking(move || {
        let mut sink = BufferedSink::default();
        let encoding = response.send(&mut sink, accept_encoding.as_deref(), accept_encoding.is_some())?;
        Ok::<_, disscache_core::Error>((sink, encoding))
    })
    .await
    .map_err(|e| McpError::internal_error(format!("delivery task failed: {e}"), None))??;

    let (body, body_encoding) = match (encoding, String::from_utf8(sink.body)) {
        (None, Ok(text)) => (text, None),
        (_, Ok(text)) => (BASE64.encode(text.as_bytes()), Some("base64".to_string())),
        (_, Err(e)) => (BASE64.encode(e.as_bytes()), Some("base64".to_string())),
    };

    let output = GetResponseOutput {
        status: sink.status,
        headers: sink.headers.into_iter().map(|(name, value)| HeaderOutput { name, value }).collect(),
        body,
        body_encoding,
        body_file: None,
        content_encoding: encoding.map(|e| e.as_str().to_string()),
        hit,
    };
    super::json_result(&output)
}
