//! PostgreSQL execution engine.
//!
//! Validated query text is passed through to the warehouse verbatim; the
//! engine never rewrites it. Row limits are enforced by streaming: the
//! engine fetches at most `limit + 1` rows and reports truncation when the
//! extra row materializes. Catalog lookups use `information_schema` with
//! bound parameters.

use crate::db::types::{row_column_metadata, row_to_json_map};
use crate::db::{ExecuteOptions, ExecutionEngine};
use crate::error::{ServerError, ServerResult};
use crate::models::{ColumnInfo, QueryResult, TableIdentifier};
use futures_util::StreamExt;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Executor, PgPool, Row};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const LIST_TABLES_SQL: &str = "\
    SELECT table_catalog, table_schema, table_name \
    FROM information_schema.tables \
    WHERE table_type IN ('BASE TABLE', 'VIEW') \
      AND table_schema NOT IN ('pg_catalog', 'information_schema') \
      AND ($1::text IS NULL OR table_catalog = $1) \
    ORDER BY table_catalog, table_schema, table_name";

const DESCRIBE_TABLE_SQL: &str = "\
    SELECT column_name, data_type, is_nullable \
    FROM information_schema.columns \
    WHERE table_catalog = $1 AND table_schema = $2 AND table_name = $3 \
    ORDER BY ordinal_position";

/// sqlx-backed execution engine over a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgEngine {
    pool: PgPool,
}

impl PgEngine {
    /// Connect to the warehouse and verify the connection works.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> ServerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| {
                ServerError::configuration(format!("Failed to connect to warehouse: {e}"))
            })?;

        match sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&pool)
            .await
        {
            Ok(version) => info!(version = %version, "Connected to warehouse"),
            Err(e) => warn!(error = %e, "Connected, but failed to read server version"),
        }

        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_limited(
        &self,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> ServerResult<Vec<PgRow>> {
        let fetch_limit = row_limit as usize + 1;
        let rows_future = self.pool.fetch(sql).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => {
                let mut rows = Vec::with_capacity(results.len());
                for result in results {
                    rows.push(result.map_err(ServerError::from)?);
                }
                Ok(rows)
            }
            Err(_) => Err(ServerError::upstream(
                format!(
                    "Query timed out after {} seconds",
                    query_timeout.as_secs()
                ),
                None,
            )),
        }
    }
}

impl ExecutionEngine for PgEngine {
    async fn execute(&self, sql: &str, opts: ExecuteOptions) -> ServerResult<QueryResult> {
        let start = Instant::now();

        debug!(
            sql = %sql,
            limit = opts.row_limit,
            timeout_secs = opts.timeout.as_secs(),
            "Executing query"
        );

        let rows = self.fetch_limited(sql, opts.row_limit, opts.timeout).await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        if rows.is_empty() {
            return Ok(QueryResult::empty(execution_time_ms));
        }

        let truncated = rows.len() > opts.row_limit as usize;
        let rows_to_take = (opts.row_limit as usize).min(rows.len());

        if truncated {
            warn!(
                total_rows = rows.len(),
                limit = opts.row_limit,
                "Query result truncated"
            );
        }

        Ok(QueryResult {
            columns: row_column_metadata(&rows[0]),
            rows: rows.iter().take(rows_to_take).map(row_to_json_map).collect(),
            truncated,
            execution_time_ms,
        })
    }

    async fn list_tables_raw(&self, database: Option<&str>) -> ServerResult<Vec<TableIdentifier>> {
        let rows = sqlx::query(LIST_TABLES_SQL)
            .bind(database)
            .fetch_all(&self.pool)
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            tables.push(TableIdentifier::new(
                row.try_get::<String, _>("table_catalog")?,
                row.try_get::<String, _>("table_schema")?,
                row.try_get::<String, _>("table_name")?,
            )?);
        }
        Ok(tables)
    }

    async fn describe_raw(&self, table: &TableIdentifier) -> ServerResult<Vec<ColumnInfo>> {
        let rows = sqlx::query(DESCRIBE_TABLE_SQL)
            .bind(&table.database)
            .bind(&table.schema)
            .bind(&table.table)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(ServerError::not_found(table.to_string()));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(ColumnInfo {
                name: row.try_get::<String, _>("column_name")?,
                data_type: row.try_get::<String, _>("data_type")?,
                nullable: row.try_get::<String, _>("is_nullable")? == "YES",
            });
        }
        Ok(columns)
    }
}
