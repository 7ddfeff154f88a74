//! MCP service implementation using rmcp.
//!
//! This module defines the WarehouseService struct exposing the read-only
//! warehouse tools via the MCP protocol using the rmcp framework's macros.
//! Authorization failures surface as protocol errors with semantic codes:
//! guard rejections and policy denials are caller-correctable
//! (invalid_params), catalog misses are resource_not_found.

use crate::db::PgEngine;
use crate::policy::AllowListPolicy;
use crate::tools::catalog::{
    CatalogAccessor, DescribeTableInput, DescribeTableOutput, ListTablesInput, ListTablesOutput,
};
use crate::tools::query::{QueryInput, QueryOutput, QueryToolHandler};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct WarehouseService {
    /// Query handler: guard, policy check, then execution
    query_handler: Arc<QueryToolHandler<PgEngine>>,
    /// Catalog accessor applying the allow-list to listings and descriptions
    catalog: Arc<CatalogAccessor<PgEngine>>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl WarehouseService {
    /// Create a new WarehouseService over a connected engine and a parsed
    /// scope policy.
    pub fn new(
        engine: PgEngine,
        policy: AllowListPolicy,
        default_row_limit: u32,
        default_timeout: Duration,
    ) -> Self {
        Self {
            query_handler: Arc::new(QueryToolHandler::with_defaults(
                engine.clone(),
                policy.clone(),
                default_row_limit,
                default_timeout,
            )),
            catalog: Arc::new(CatalogAccessor::new(engine, policy)),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl WarehouseService {
    #[tool(
        description = "Execute a read-only SELECT query against the warehouse.\nThe statement must be a single SELECT (or WITH ... SELECT) and every table must be fully qualified as database.schema.table.\nResults are capped at the row limit (default 100, max 10000)."
    )]
    async fn read_query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<Json<QueryOutput>, McpError> {
        self.query_handler
            .query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List tables visible under the configured scopes.\nReturns fully qualified names (database.schema.table). Optionally restrict to one database."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        self.catalog
            .list_tables(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Get column information for a table.\nThe table name must be fully qualified as database.schema.table and fall inside the configured scopes."
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<Json<DescribeTableOutput>, McpError> {
        self.catalog
            .describe_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for WarehouseService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "warehouse-mcp-server".to_owned(),
                title: Some("Warehouse MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only analytical warehouse access.\n\
                \n\
                ## Workflow\n\
                1. Call `list_tables` to discover tables inside the permitted scopes\n\
                2. Call `describe_table` to inspect a table's columns\n\
                3. Call `read_query` with a single SELECT statement\n\
                \n\
                ## Rules\n\
                - Only SELECT (and WITH ... SELECT) statements are accepted\n\
                - Every table reference must be fully qualified: database.schema.table\n\
                - One statement per call; multi-statement input is rejected\n\
                - Access is limited to the configured database/schema scopes\n\
                - Results are truncated at the row limit; narrow the query or raise `limit` if needed"
                    .to_string(),
            ),
        }
    }
}
