//! End-to-end authorization tests over a mock execution engine.
//!
//! The mock records every engine call, so these tests can assert the core
//! guarantee directly: a rejected or denied request never reaches the
//! engine, and catalog responses never reveal out-of-scope tables.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warehouse_mcp_server::db::{ExecuteOptions, ExecutionEngine};
use warehouse_mcp_server::error::{ServerError, ServerResult};
use warehouse_mcp_server::models::{ColumnInfo, ColumnMetadata, QueryResult, TableIdentifier};
use warehouse_mcp_server::policy::AllowListPolicy;
use warehouse_mcp_server::tools::catalog::{CatalogAccessor, DescribeTableInput, ListTablesInput};
use warehouse_mcp_server::tools::query::{QueryInput, QueryToolHandler};

#[derive(Default)]
struct MockInner {
    calls: Mutex<Vec<String>>,
    tables: Vec<TableIdentifier>,
    columns: HashMap<String, Vec<ColumnInfo>>,
}

/// Recording engine double. Clones share state, so a test can hold one
/// handle for assertions while the handler owns another.
#[derive(Clone, Default)]
struct MockEngine {
    inner: Arc<MockInner>,
}

impl MockEngine {
    fn with_tables(tables: Vec<TableIdentifier>) -> Self {
        Self {
            inner: Arc::new(MockInner {
                tables,
                ..Default::default()
            }),
        }
    }

    fn with_columns(table: &TableIdentifier, columns: Vec<ColumnInfo>) -> Self {
        let mut map = HashMap::new();
        map.insert(table.to_string(), columns);
        Self {
            inner: Arc::new(MockInner {
                columns: map,
                ..Default::default()
            }),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.inner.calls.lock().unwrap().push(call.into());
    }
}

impl ExecutionEngine for MockEngine {
    async fn execute(&self, sql: &str, _opts: ExecuteOptions) -> ServerResult<QueryResult> {
        self.record(format!("execute:{sql}"));
        Ok(QueryResult {
            columns: vec![ColumnMetadata {
                name: "n".to_string(),
                type_name: "INT4".to_string(),
                nullable: false,
            }],
            rows: vec![serde_json::Map::from_iter([(
                "n".to_string(),
                serde_json::json!(1),
            )])],
            truncated: false,
            execution_time_ms: 1,
        })
    }

    async fn list_tables_raw(&self, database: Option<&str>) -> ServerResult<Vec<TableIdentifier>> {
        self.record("list_tables_raw");
        Ok(self
            .inner
            .tables
            .iter()
            .filter(|t| database.is_none_or(|db| t.database == db))
            .cloned()
            .collect())
    }

    async fn describe_raw(&self, table: &TableIdentifier) -> ServerResult<Vec<ColumnInfo>> {
        self.record(format!("describe_raw:{table}"));
        match self.inner.columns.get(&table.to_string()) {
            Some(columns) => Ok(columns.clone()),
            None => Err(ServerError::not_found(table.to_string())),
        }
    }
}

fn table(db: &str, schema: &str, name: &str) -> TableIdentifier {
    TableIdentifier::new(db, schema, name).unwrap()
}

fn policy(config: &str) -> AllowListPolicy {
    AllowListPolicy::parse(Some(config)).unwrap()
}

fn query_handler(engine: MockEngine, policy: AllowListPolicy) -> QueryToolHandler<MockEngine> {
    QueryToolHandler::with_defaults(engine, policy, 100, Duration::from_secs(30))
}

fn query_input(sql: &str) -> QueryInput {
    QueryInput {
        sql: sql.to_string(),
        limit: None,
        timeout_secs: None,
    }
}

// =============================================================================
// read_query
// =============================================================================

#[tokio::test]
async fn test_allowed_query_reaches_engine() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), policy("compound_pipeline"));

    let output = handler
        .query(query_input(
            "SELECT gene FROM compound_pipeline.oncology_all.genetarget",
        ))
        .await
        .unwrap();

    assert_eq!(output.row_count, 1);
    assert_eq!(engine.calls().len(), 1);
    assert!(engine.calls()[0].starts_with("execute:"));
}

#[tokio::test]
async fn test_query_text_passes_through_verbatim() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), AllowListPolicy::unrestricted());

    let sql = "SELECT a, b  FROM db.s.t WHERE a > 1 -- trailing note";
    handler.query(query_input(sql)).await.unwrap();

    assert_eq!(engine.calls(), vec![format!("execute:{sql}")]);
}

#[tokio::test]
async fn test_denied_query_never_reaches_engine() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), policy("compound_pipeline.oncology_all"));

    let err = handler
        .query(query_input(
            "SELECT * FROM compound_pipeline.clinicaltrials.studies",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Denied { .. }));
    assert!(err.to_string().contains("compound_pipeline.clinicaltrials"));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_join_with_one_disallowed_table_is_denied() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), policy("db_a"));

    let err = handler
        .query(query_input(
            "SELECT * FROM db_a.s.t1 JOIN db_b.s.t2 ON db_a.s.t1.id = db_b.s.t2.id",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Denied { .. }));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_mutating_statement_rejected_without_engine_call() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), AllowListPolicy::unrestricted());

    for sql in [
        "UPDATE db.s.t SET a = 1",
        "DELETE FROM db.s.t",
        "DROP TABLE db.s.t",
        "INSERT INTO db.s.t VALUES (1)",
        "CREATE TABLE db.s.t (a INT)",
    ] {
        let err = handler.query(query_input(sql)).await.unwrap_err();
        assert!(matches!(err, ServerError::Rejected { .. }), "sql: {sql}");
    }

    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_multi_statement_rejected_without_engine_call() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), AllowListPolicy::unrestricted());

    let err = handler
        .query(query_input("SELECT 1; DROP TABLE db.s.t"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Rejected { .. }));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_unqualified_reference_rejected_without_engine_call() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), AllowListPolicy::unrestricted());

    let err = handler
        .query(query_input("SELECT * FROM genetarget"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Rejected { .. }));
    assert!(err.to_string().contains("genetarget"));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_keyword_inside_string_literal_is_not_rejected() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), AllowListPolicy::unrestricted());

    handler
        .query(query_input(
            "SELECT * FROM db.s.audit WHERE action = 'DROP TABLE users'",
        ))
        .await
        .unwrap();

    assert_eq!(engine.calls().len(), 1);
}

#[tokio::test]
async fn test_cte_query_authorized_by_underlying_tables() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), policy("db_a"));

    // The CTE name "recent" is bare, but it is a declared CTE, not a table.
    handler
        .query(query_input(
            "WITH recent AS (SELECT * FROM db_a.s.events) SELECT * FROM recent",
        ))
        .await
        .unwrap();

    assert_eq!(engine.calls().len(), 1);
}

#[tokio::test]
async fn test_cte_over_disallowed_table_is_denied() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), policy("db_a"));

    let err = handler
        .query(query_input(
            "WITH hidden AS (SELECT * FROM db_b.s.secrets) SELECT * FROM hidden",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Denied { .. }));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_data_modifying_cte_rejected_without_engine_call() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), AllowListPolicy::unrestricted());

    // PostgreSQL executes DELETE/UPDATE CTE bodies even under a SELECT
    // terminal; they must be refused before the engine sees them.
    for sql in [
        "WITH purge AS (DELETE FROM db.s.audit RETURNING id) SELECT * FROM purge",
        "WITH bump AS (UPDATE db.s.audit SET seen = true RETURNING id) SELECT * FROM bump",
    ] {
        let err = handler.query(query_input(sql)).await.unwrap_err();
        assert!(matches!(err, ServerError::Rejected { .. }), "sql: {sql}");
    }

    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_oversized_limit_is_capped_with_warning() {
    let engine = MockEngine::default();
    let handler = query_handler(engine.clone(), AllowListPolicy::unrestricted());

    let output = handler
        .query(QueryInput {
            sql: "SELECT * FROM db.s.t".to_string(),
            limit: Some(1_000_000),
            timeout_secs: None,
        })
        .await
        .unwrap();

    assert!(output.warning.is_some());
    assert!(output.warning.unwrap().contains("10000"));
}

// =============================================================================
// list_tables
// =============================================================================

fn catalog_fixture() -> Vec<TableIdentifier> {
    vec![
        table("compound_pipeline", "oncology_all", "genetarget"),
        table("compound_pipeline", "oncology_all", "compounds"),
        table("compound_pipeline", "clinicaltrials", "studies"),
        table("reference_db", "public", "gene_names"),
    ]
}

#[tokio::test]
async fn test_list_tables_filters_out_of_scope() {
    let engine = MockEngine::with_tables(catalog_fixture());
    let catalog = CatalogAccessor::new(engine, policy("compound_pipeline.oncology_all"));

    let output = catalog
        .list_tables(ListTablesInput { database: None })
        .await
        .unwrap();

    assert_eq!(
        output.tables,
        vec![
            "compound_pipeline.oncology_all.genetarget",
            "compound_pipeline.oncology_all.compounds",
        ]
    );
    assert_eq!(output.count, 2);
}

#[tokio::test]
async fn test_list_tables_unrestricted_returns_everything() {
    let engine = MockEngine::with_tables(catalog_fixture());
    let catalog = CatalogAccessor::new(engine, AllowListPolicy::unrestricted());

    let output = catalog
        .list_tables(ListTablesInput { database: None })
        .await
        .unwrap();

    assert_eq!(output.count, 4);
}

#[tokio::test]
async fn test_list_tables_database_filter_combines_with_policy() {
    let engine = MockEngine::with_tables(catalog_fixture());
    let catalog = CatalogAccessor::new(
        engine,
        policy("compound_pipeline.oncology_all,reference_db"),
    );

    let output = catalog
        .list_tables(ListTablesInput {
            database: Some("reference_db".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(output.tables, vec!["reference_db.public.gene_names"]);
}

// =============================================================================
// describe_table
// =============================================================================

#[tokio::test]
async fn test_describe_table_returns_columns() {
    let target = table("compound_pipeline", "oncology_all", "genetarget");
    let engine = MockEngine::with_columns(
        &target,
        vec![ColumnInfo {
            name: "gene".to_string(),
            data_type: "character varying".to_string(),
            nullable: true,
        }],
    );
    let catalog = CatalogAccessor::new(engine, policy("compound_pipeline"));

    let output = catalog
        .describe_table(DescribeTableInput {
            table_name: "compound_pipeline.oncology_all.genetarget".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(output.count, 1);
    assert_eq!(output.columns[0].name, "gene");
}

#[tokio::test]
async fn test_describe_out_of_scope_denied_before_catalog_lookup() {
    let engine = MockEngine::default();
    let catalog = CatalogAccessor::new(engine.clone(), policy("compound_pipeline"));

    // The table does not exist either; the caller must still get a denial,
    // never a not-found, and the catalog must not be consulted.
    let err = catalog
        .describe_table(DescribeTableInput {
            table_name: "secret_db.s.anything".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Denied { .. }));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_describe_missing_table_in_scope_is_not_found() {
    let engine = MockEngine::default();
    let catalog = CatalogAccessor::new(engine.clone(), policy("compound_pipeline"));

    let err = catalog
        .describe_table(DescribeTableInput {
            table_name: "compound_pipeline.oncology_all.no_such_table".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::NotFound { .. }));
    assert_eq!(engine.calls().len(), 1);
}

#[tokio::test]
async fn test_describe_rejects_partial_identifier() {
    let engine = MockEngine::default();
    let catalog = CatalogAccessor::new(engine.clone(), AllowListPolicy::unrestricted());

    for name in ["genetarget", "oncology_all.genetarget", "a.b.c.d"] {
        let err = catalog
            .describe_table(DescribeTableInput {
                table_name: name.to_string(),
            })
            .await
            .unwrap_err();
        assert!(
            matches!(err, ServerError::MalformedIdentifier { .. }),
            "name: {name}"
        );
    }

    assert!(engine.calls().is_empty());
}
