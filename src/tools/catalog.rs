//! Catalog introspection tools.
//!
//! This module implements the `list_tables` and `describe_table` MCP tools.
//! Both consult the warehouse catalog through the execution engine, and both
//! apply the scope allow-list: listing silently omits out-of-scope tables,
//! describing an out-of-scope table is denied before the catalog is touched
//! so the response cannot reveal whether the table exists.

use crate::db::ExecutionEngine;
use crate::error::ServerResult;
use crate::models::{ColumnInfo, TableIdentifier};
use crate::policy::AllowListPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for the list_tables tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Restrict the listing to one database. Omit to list every visible
    /// database.
    #[serde(default)]
    pub database: Option<String>,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// Fully qualified table names (database.schema.table) inside the
    /// configured scopes
    pub tables: Vec<String>,
    /// Number of tables returned
    pub count: usize,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Fully qualified table name: database.schema.table
    pub table_name: String,
}

/// Output from the describe_table tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeTableOutput {
    /// The described table, fully qualified
    pub table_name: String,
    /// Column definitions in catalog order
    pub columns: Vec<ColumnInfo>,
    /// Number of columns
    pub count: usize,
}

/// Catalog accessor applying the scope allow-list over the engine's raw
/// catalog views.
pub struct CatalogAccessor<E> {
    engine: E,
    policy: AllowListPolicy,
}

impl<E: ExecutionEngine> CatalogAccessor<E> {
    pub fn new(engine: E, policy: AllowListPolicy) -> Self {
        Self { engine, policy }
    }

    /// Handle the list_tables tool call.
    ///
    /// Out-of-scope tables are filtered out, not reported; the caller sees
    /// the catalog as if only the permitted scopes existed. The engine's
    /// ordering is preserved.
    pub async fn list_tables(&self, input: ListTablesInput) -> ServerResult<ListTablesOutput> {
        let tables = self
            .engine
            .list_tables_raw(input.database.as_deref())
            .await?;

        let total = tables.len();
        let visible: Vec<String> = tables
            .into_iter()
            .filter(|table| self.policy.is_allowed(table))
            .map(|table| table.to_string())
            .collect();

        info!(
            total,
            visible = visible.len(),
            database = ?input.database,
            "Listed catalog tables"
        );

        Ok(ListTablesOutput {
            count: visible.len(),
            tables: visible,
        })
    }

    /// Handle the describe_table tool call.
    ///
    /// The identifier must be fully qualified. The policy check runs before
    /// the catalog lookup, so a denied scope gets the same answer whether or
    /// not the table exists.
    pub async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> ServerResult<DescribeTableOutput> {
        let table: TableIdentifier = input.table_name.parse()?;

        if !self.policy.is_allowed(&table) {
            return Err(crate::error::ServerError::denied(table.scope()));
        }

        let columns = self.engine.describe_raw(&table).await?;

        info!(table = %table, columns = columns.len(), "Described table");

        Ok(DescribeTableOutput {
            table_name: table.to_string(),
            count: columns.len(),
            columns,
        })
    }
}
