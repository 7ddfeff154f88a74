//! Warehouse MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to run read-only, scope-limited queries against an analytical PostgreSQL
//! warehouse.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod policy;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::ServerError;
pub use mcp::WarehouseService;
pub use policy::AllowListPolicy;
