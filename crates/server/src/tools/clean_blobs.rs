//! clean_blobs tool implementation.
//!
//! Shrinks the blob cache on demand, independently of the scheduled runs.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use disscache_client::{BlobCache, CleanStats, EvictionPolicy};

/// Parameters for the clean_blobs tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CleanBlobsParams {
    /// Size limit in megabytes. Defaults to the configured limit.
    pub max_size_mb: Option<u64>,

    /// `oldest_first` or `largest_first`. Defaults to the configured policy.
    pub policy: Option<String>,
}

/// Output from the clean_blobs tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CleanBlobsOutput {
    pub removed_files: usize,
    pub removed_bytes: u64,
    pub retained_bytes: u64,
    pub removed_dirs: usize,
}

impl From<CleanStats> for CleanBlobsOutput {
    fn from(stats: CleanStats) -> Self {
        Self {
            removed_files: stats.removed_files,
            removed_bytes: stats.removed_bytes,
            retained_bytes: stats.retained_bytes,
            removed_dirs: stats.removed_dirs,
        }
    }
}

/// Limits used when a call does not override them.
#[derive(Debug, Clone, Copy)]
pub struct CleanDefaults {
    pub max_size_bytes: u64,
    pub policy: EvictionPolicy,
}

/// Implementation of the clean_blobs tool.
pub async fn clean_blobs_impl(
    blobs: &BlobCache, defaults: CleanDefaults, params: CleanBlobsParams,
) -> Result<CallToolResult, McpError> {
    let policy = match params.policy.as_deref() {
        Some(policy) => policy.parse::<EvictionPolicy>()?,
        None => defaults.policy,
    };
    let max_size_bytes = params
        .max_size_mb
        .map_or(defaults.max_size_bytes, |mb| mb.saturating_mul(1024 * 1024));

    let blobs = blobs.clone();
    let stats = tokio::task::spawn_blocking(move || blobs.clean(max_size_bytes, policy))
        .await
        .map_err(|e| McpError::internal_error(format!("clean task failed: {e}"), None))??;

    super::json_result(&CleanBlobsOutput::from(stats))
}
