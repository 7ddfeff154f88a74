//! MCP tool implementations.
//!
//! This module contains the tool handlers and the authorization layer they
//! share:
//! - `read_query`: Execute an authorized read-only SELECT statement
//! - `list_tables`: List catalog tables inside the configured scopes
//! - `describe_table`: Get column information for one table
//! - `sql_guard`: Structural read-only/qualification checks over SQL text

pub mod catalog;
pub mod query;
pub mod sql_guard;

pub use catalog::{
    CatalogAccessor, DescribeTableInput, DescribeTableOutput, ListTablesInput, ListTablesOutput,
};
pub use query::{QueryDecision, QueryInput, QueryOutcome, QueryOutput, QueryToolHandler, authorize};
pub use sql_guard::GuardVerdict;
