//! Data models for the warehouse MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod identifier;
pub mod query;

// Re-export commonly used types
pub use identifier::TableIdentifier;
pub use query::{ColumnInfo, ColumnMetadata, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryResult};
