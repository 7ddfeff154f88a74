//! Error types for the warehouse MCP server.
//!
//! This module defines all error types using `thiserror`. Each variant maps
//! to one of the outcomes the tool surface can report: configuration
//! problems (startup-fatal), caller-correctable input errors, guard
//! rejections, policy denials, catalog misses, and upstream engine failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed allow-list or connection configuration. Fatal at startup;
    /// the process does not proceed.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A table name that is not fully qualified as `database.schema.table`.
    #[error(
        "Malformed table identifier '{input}': expected fully qualified 'database.schema.table'"
    )]
    MalformedIdentifier { input: String },

    /// SQL that is structurally unsafe to execute: multi-statement,
    /// non-read-only, or containing an unqualified table reference.
    #[error("Statement rejected: {reason}")]
    Rejected { reason: String },

    /// A referenced scope falls outside the allow-list. The message names
    /// only the scope; it must not reveal whether the table exists.
    #[error("Access denied: scope '{scope}' is not covered by the configured allow-list")]
    Denied { scope: String },

    /// Scope allowed but the table is absent from the catalog.
    #[error("Table '{table}' not found in the warehouse catalog")]
    NotFound { table: String },

    /// The execution engine itself failed: connectivity, SQL syntax beyond
    /// the guard's structural checks, or a runtime error. Never retried here.
    #[error("Warehouse error: {message}")]
    Upstream {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },
}

impl ServerError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a malformed identifier error.
    pub fn malformed_identifier(input: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            input: input.into(),
        }
    }

    /// Create a rejected statement error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Create a denied error for a database/schema scope.
    pub fn denied(scope: impl Into<String>) -> Self {
        Self::Denied {
            scope: scope.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(table: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
        }
    }

    /// Create an upstream engine error.
    pub fn upstream(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            sql_state,
        }
    }

    /// True for errors the caller can fix by changing the request.
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            Self::MalformedIdentifier { .. } | Self::Rejected { .. } | Self::Denied { .. }
        )
    }
}

/// Convert sqlx errors into upstream engine errors.
impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ServerError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ServerError::upstream(db_err.message().to_string(), code)
            }
            sqlx::Error::PoolTimedOut => {
                ServerError::upstream("Connection pool acquire timed out", None)
            }
            sqlx::Error::PoolClosed => ServerError::upstream("Connection pool is closed", None),
            sqlx::Error::Io(io_err) => ServerError::upstream(format!("I/O error: {io_err}"), None),
            sqlx::Error::Tls(tls_err) => {
                ServerError::upstream(format!("TLS error: {tls_err}"), None)
            }
            sqlx::Error::Protocol(msg) => {
                ServerError::upstream(format!("Protocol error: {msg}"), None)
            }
            other => ServerError::upstream(other.to_string(), None),
        }
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Convert ServerError to MCP ErrorData for semantic error categorization.
///
/// Caller-correctable errors map to `invalid_params`, catalog misses to
/// `resource_not_found`, and everything else to `internal_error`.
impl From<ServerError> for rmcp::ErrorData {
    fn from(err: ServerError) -> Self {
        match &err {
            ServerError::MalformedIdentifier { .. }
            | ServerError::Rejected { .. }
            | ServerError::Denied { .. } => rmcp::ErrorData::invalid_params(err.to_string(), None),

            ServerError::NotFound { .. } => {
                rmcp::ErrorData::resource_not_found(err.to_string(), None)
            }

            ServerError::Upstream { sql_state, .. } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", err, code),
                    None => err.to_string(),
                };
                rmcp::ErrorData::internal_error(msg, None)
            }

            ServerError::Configuration { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), None)
            }
        }
    }
}
