//! Transport layer for the MCP server.
//!
//! Two transports carry the protocol: stdio for CLI-hosted assistants and
//! HTTP (with SSE streaming) for web clients. Both serve the same
//! `WarehouseService`; the authorization pipeline is transport-agnostic.

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::error::ServerResult;
use std::future::Future;

/// A way to serve the MCP protocol until shutdown.
pub trait Transport: Send + Sync {
    /// Serve requests until the transport shuts down. Blocks for the
    /// lifetime of the server.
    fn run(&self) -> impl Future<Output = ServerResult<()>> + Send;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}
