//! MCP tool implementations.
//!
//! This module contains all tools exposed by the disscache server.

pub mod clean_blobs;
pub mod get_response;
pub mod prune_resource;

pub use clean_blobs::{CleanBlobsParams, clean_blobs_impl};
pub use get_response::{GetResponseParams, get_response_impl};
pub use prune_resource::{PruneResourceParams, prune_resource_impl};

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Pretty-printed JSON tool result.
fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| McpError::internal_error(format!("Failed to serialize output: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
