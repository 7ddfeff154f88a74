//! MCP protocol surface.
//!
//! Binds the warehouse tool handlers to the rmcp framework's router and
//! server traits.

pub mod service;

pub use service::WarehouseService;
