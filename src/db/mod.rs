//! Warehouse execution engine.
//!
//! This module defines the boundary contract toward the warehouse and its
//! PostgreSQL implementation:
//! - `ExecutionEngine`: execute validated SQL, enumerate and describe tables
//! - `PgEngine`: sqlx-backed implementation over a connection pool
//! - `types`: row-to-JSON decoding

pub mod engine;
pub mod types;

pub use engine::PgEngine;

use crate::error::ServerResult;
use crate::models::{ColumnInfo, QueryResult, TableIdentifier};
use std::future::Future;
use std::time::Duration;

/// Per-query execution options.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Maximum rows to return
    pub row_limit: u32,
    /// Query timeout
    pub timeout: Duration,
}

/// Boundary contract toward the warehouse engine.
///
/// The core above this trait never constructs SQL for `execute`; it passes
/// the validated text through verbatim, and it never calls the engine for a
/// request the guard or the policy rejects.
pub trait ExecutionEngine: Send + Sync {
    /// Execute a validated read-only statement and return its rows.
    fn execute(
        &self,
        sql: &str,
        opts: ExecuteOptions,
    ) -> impl Future<Output = ServerResult<QueryResult>> + Send;

    /// Enumerate user tables from the catalog, optionally restricted to one
    /// database, in the catalog's own ordering.
    fn list_tables_raw(
        &self,
        database: Option<&str>,
    ) -> impl Future<Output = ServerResult<Vec<TableIdentifier>>> + Send;

    /// Describe a table's columns from the catalog. Fails with NotFound if
    /// the table is absent.
    fn describe_raw(
        &self,
        table: &TableIdentifier,
    ) -> impl Future<Output = ServerResult<Vec<ColumnInfo>>> + Send;
}
