//! HTTP transport with Streamable HTTP support for the MCP server.
//!
//! This transport uses HTTP with SSE streaming responses,
//! which is suitable for web-based MCP integrations.

use crate::db::PgEngine;
use crate::error::{ServerError, ServerResult};
use crate::mcp::WarehouseService;
use crate::transport::Transport;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// HTTP transport implementation with Streamable HTTP support.
///
/// This transport provides:
/// - HTTP endpoints for MCP protocol messages
/// - Server-Sent Events for streaming responses
/// - Session management for stateful connections
pub struct HttpTransport {
    service: WarehouseService,
    engine: PgEngine,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// MCP endpoint path
    endpoint: String,
}

impl HttpTransport {
    /// Create a new HTTP transport serving the given service.
    pub fn new(
        service: WarehouseService,
        engine: PgEngine,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            service,
            engine,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> ServerResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with HTTP transport on {}", bind_addr);

        // Clone the service for the per-session factory closure
        let session_service = self.service.clone();
        let service = StreamableHttpService::new(
            move || Ok(session_service.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // Build the axum router with configurable endpoint
        // Note: nest_service doesn't support root path "/", use fallback_service instead
        let app = if self.endpoint == "/" {
            axum::Router::new().fallback_service(service)
        } else {
            axum::Router::new().nest_service(&self.endpoint, service)
        };

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::configuration(format!(
                "Failed to bind to {bind_addr}: {e}. Check that the port is available"
            ))
        })?;

        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        // Graceful shutdown: SSE connections may keep the server alive indefinitely,
        // so we force exit after a timeout once shutdown signal is received
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // Race between: server completing normally vs forced timeout/second signal after shutdown
        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(ServerError::upstream(
                            format!("HTTP server error: {e}"),
                            None,
                        ));
                    }
                }
            }
            _ = async {
                // Wait for shutdown signal, then wait for either timeout or second signal
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {
                // Timeout or second signal reached - server will be dropped
            }
        }

        info!("Closing warehouse connection pool");
        self.engine.close().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
