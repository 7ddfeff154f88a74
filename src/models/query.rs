//! Query and catalog result models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default maximum number of rows returned by a query.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Hard cap on the number of rows returned by a query.
pub const MAX_ROW_LIMIT: u32 = 10_000;

/// Metadata for a result-set column.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

/// One column of a described table, from the warehouse catalog.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Catalog data type (e.g. "integer", "character varying")
    pub data_type: String,
    /// True if the column accepts NULL
    pub nullable: bool,
}

/// Rows and metadata returned by the execution engine for one query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// True if the result was cut off at the row limit
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// An empty result (no columns, no rows).
    pub fn empty(execution_time_ms: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            truncated: false,
            execution_time_ms,
        }
    }
}
