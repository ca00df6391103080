//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::service::Service;
use crate::tools::clean_blobs::CleanDefaults;
use crate::tools::{
    CleanBlobsParams, GetResponseParams, PruneResourceParams, clean_blobs_impl, get_response_impl,
    prune_resource_impl,
};

use disscache_client::BlobCache;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for disscache.
#[derive(Clone)]
pub struct DisscacheServer {
    service: Service,
    blobs: BlobCache,
    clean_defaults: CleanDefaults,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl DisscacheServer {
    /// Create a new server handler.
    pub fn new(service: Service, blobs: BlobCache, clean_defaults: CleanDefaults) -> Self {
        Self { service, blobs, clean_defaults, tool_router: Self::tool_router() }
    }

    /// Serve the response for a resource.
    ///
    /// Failures come back as error responses with a status, not as tool errors.
    #[tool(
        description = "Get the cached response for a repository resource, computing it on a miss. Set binary=true in params for the resource's binary, redirect=true for a redirect."
    )]
    async fn get_response(&self, params: Parameters<GetResponseParams>) -> Result<CallToolResult, McpError> {
        get_response_impl(&self.service, params.0).await
    }

    #[tool(description = "Drop every cached response of a resource. Its metadata snapshot is kept.")]
    async fn prune_resource(&self, params: Parameters<PruneResourceParams>) -> Result<CallToolResult, McpError> {
        prune_resource_impl(&self.service, params.0).await
    }

    #[tool(description = "Evict blobs until the blob cache fits the size limit, then remove empty directories.")]
    async fn clean_blobs(&self, params: Parameters<CleanBlobsParams>) -> Result<CallToolResult, McpError> {
        clean_blobs_impl(&self.blobs, self.clean_defaults, params.0).await
    }
}

impl ServerHandler for DisscacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "disscache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::service;
    use disscache_client::EvictionPolicy;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tools_listed() {
        let (service, _) = service().await;
        let tmp = tempfile::tempdir().unwrap();
        let http = disscache_client::http_client("test", Duration::from_secs(1), 0).unwrap();
        let blobs = BlobCache::new(tmp.path(), BTreeMap::new(), http);
        let defaults = CleanDefaults { max_size_bytes: 0, policy: EvictionPolicy::OldestFirst };

        let server = DisscacheServer::new(service, blobs, defaults);
        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, ["clean_blobs", "get_response", "prune_resource"]);
        assert_eq!(server.get_info().server_info.name, "disscache");
    }
}
