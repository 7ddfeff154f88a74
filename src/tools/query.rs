//! Query execution tool.
//!
//! This module implements the `read_query` MCP tool. A submitted statement
//! goes through two gates before it can reach the warehouse: the structural
//! guard (single read-only statement, fully qualified references) and the
//! scope allow-list. The engine is only ever invoked for a statement that
//! passed both; a rejected or denied statement costs no warehouse work.

use crate::db::{ExecuteOptions, ExecutionEngine};
use crate::error::{ServerError, ServerResult};
use crate::models::{
    ColumnMetadata, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryResult, TableIdentifier,
};
use crate::policy::AllowListPolicy;
use crate::tools::sql_guard::{self, GuardVerdict};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

/// Outcome of authorizing one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Structurally sound and every referenced scope is permitted.
    Allowed,
    /// Structurally sound, but a referenced scope falls outside the
    /// allow-list. Carries the first offending scope.
    Denied { scope: String },
    /// Structurally unsafe; never evaluated against the policy.
    Rejected { reason: String },
}

/// Authorization decision for one statement, including the table references
/// the guard extracted (empty for rejections).
#[derive(Debug, Clone)]
pub struct QueryDecision {
    pub outcome: QueryOutcome,
    pub referenced_tables: Vec<TableIdentifier>,
}

impl QueryDecision {
    /// True if the statement may be sent to the engine.
    pub fn is_allowed(&self) -> bool {
        self.outcome == QueryOutcome::Allowed
    }

    /// Convert into a result: the referenced tables on success, the
    /// matching error otherwise.
    pub fn into_result(self) -> ServerResult<Vec<TableIdentifier>> {
        match self.outcome {
            QueryOutcome::Allowed => Ok(self.referenced_tables),
            QueryOutcome::Denied { scope } => Err(ServerError::denied(scope)),
            QueryOutcome::Rejected { reason } => Err(ServerError::rejected(reason)),
        }
    }
}

/// Authorize a statement against the guard and the scope allow-list.
///
/// Pure function: no I/O, no engine access. Every referenced table must fall
/// inside the policy; a single disallowed reference denies the whole
/// statement, and the denial names the scope of the first offender in order
/// of appearance.
pub fn authorize(sql: &str, policy: &AllowListPolicy) -> QueryDecision {
    match sql_guard::evaluate(sql) {
        GuardVerdict::Rejected { reason } => QueryDecision {
            outcome: QueryOutcome::Rejected { reason },
            referenced_tables: Vec::new(),
        },
        GuardVerdict::Candidate { tables } => {
            let denied_scope = tables
                .iter()
                .find(|table| !policy.is_allowed(table))
                .map(TableIdentifier::scope);
            QueryDecision {
                outcome: match denied_scope {
                    Some(scope) => QueryOutcome::Denied { scope },
                    None => QueryOutcome::Allowed,
                },
                referenced_tables: tables,
            }
        }
    }
}

/// Input for the read_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// SQL SELECT statement. Must be a single read-only statement with every
    /// table fully qualified as database.schema.table.
    pub sql: String,
    /// Maximum rows to return. Default: 100, max: 10000
    #[serde(default)]
    pub limit: Option<u32>,
    /// Query timeout in seconds. Default: 30
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

/// Output from the read_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryOutput {
    /// Column metadata (name, type, nullable)
    pub columns: Vec<ColumnMetadata>,
    /// Result rows as key-value maps
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Number of rows returned
    pub row_count: usize,
    /// True if result was truncated at the row limit
    pub truncated: bool,
    /// Query execution time in milliseconds
    pub execution_time_ms: u64,
    /// Warning message if any issues occurred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl QueryOutput {
    fn from_result(result: QueryResult, warning: Option<String>) -> Self {
        Self {
            row_count: result.rows.len(),
            columns: result.columns,
            rows: result.rows,
            truncated: result.truncated,
            execution_time_ms: result.execution_time_ms,
            warning,
        }
    }
}

/// Handler for query execution.
pub struct QueryToolHandler<E> {
    engine: E,
    policy: AllowListPolicy,
    default_limit: u32,
    default_timeout: Duration,
}

impl<E: ExecutionEngine> QueryToolHandler<E> {
    /// Create a handler with default row limit and timeout.
    pub fn new(engine: E, policy: AllowListPolicy) -> Self {
        Self::with_defaults(engine, policy, DEFAULT_ROW_LIMIT, Duration::from_secs(30))
    }

    /// Create a handler with custom defaults (from server configuration).
    pub fn with_defaults(
        engine: E,
        policy: AllowListPolicy,
        default_limit: u32,
        default_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            policy,
            default_limit: default_limit.clamp(1, MAX_ROW_LIMIT),
            default_timeout,
        }
    }

    /// Handle the read_query tool call.
    ///
    /// Authorization runs first and the engine is never invoked for a
    /// statement that fails it.
    pub async fn query(&self, input: QueryInput) -> ServerResult<QueryOutput> {
        let tables = authorize(&input.sql, &self.policy).into_result()?;

        info!(
            tables = tables.len(),
            limit = ?input.limit,
            "Statement authorized"
        );

        let limit_warning = input.limit.filter(|l| *l > MAX_ROW_LIMIT).map(|l| {
            format!(
                "Requested limit {} exceeds maximum allowed ({}). Results capped to {} rows.",
                l, MAX_ROW_LIMIT, MAX_ROW_LIMIT
            )
        });

        // Clamp to [1, MAX_ROW_LIMIT]; limit=0 would mark every result truncated
        let row_limit = input
            .limit
            .map(|l| l.clamp(1, MAX_ROW_LIMIT))
            .unwrap_or(self.default_limit);
        let timeout = input
            .timeout_secs
            .map(|t| Duration::from_secs(t as u64))
            .unwrap_or(self.default_timeout);

        let result = self
            .engine
            .execute(&input.sql, ExecuteOptions { row_limit, timeout })
            .await?;

        Ok(QueryOutput::from_result(result, limit_warning))
    }
}
