//! prune_resource tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use disscache_core::Error;

use crate::service::Service;

/// Parameters for the prune_resource tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PruneResourceParams {
    /// Resource identifier (any of its aliases).
    pub id: String,
}

/// Output from the prune_resource tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PruneResourceOutput {
    /// Number of cached responses removed.
    pub removed: u64,
}

/// Drops every cached response of a resource; its snapshot stays.
pub async fn prune_resource_impl(service: &Service, params: PruneResourceParams) -> Result<CallToolResult, McpError> {
    if params.id.trim().is_empty() {
        return Err(Error::InvalidInput("id must not be empty".to_string()).into());
    }

    let removed = service.cache().prune_for_resource(&params.id).await?;
    super::json_result(&PruneResourceOutput { removed })
}
