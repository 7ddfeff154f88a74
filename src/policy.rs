//! Database/schema scope allow-list.
//!
//! The policy is parsed once from configuration at startup and stays
//! immutable for the process lifetime. Every tool handler receives it
//! explicitly; there is no ambient global state. An empty policy grants
//! unrestricted access: a server started without `--allowed-scopes` can
//! see every table the connection role can.

use crate::error::{ServerError, ServerResult};
use crate::models::TableIdentifier;
use tracing::info;

/// One permitted scope: a whole database, or a single schema within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    database: String,
    /// None grants every schema under the database.
    schema: Option<String>,
}

impl ScopeEntry {
    /// Parse one allow-list token (`database` or `database.schema`).
    fn parse(token: &str) -> ServerResult<Self> {
        let mut parts = token.split('.');
        let database = parts.next().unwrap_or_default().trim();
        let schema = parts.next().map(str::trim);
        if parts.next().is_some() {
            return Err(ServerError::configuration(format!(
                "allow-list token '{token}' has too many parts; expected 'database' or 'database.schema'"
            )));
        }
        if database.is_empty() || schema.is_some_and(str::is_empty) {
            return Err(ServerError::configuration(format!(
                "allow-list token '{token}' has an empty part"
            )));
        }
        Ok(Self {
            database: database.to_string(),
            schema: schema.map(str::to_string),
        })
    }

    /// True if this entry covers the given table's database/schema.
    /// Comparison is case-insensitive; table names are below scope
    /// granularity and never compared.
    fn matches(&self, table: &TableIdentifier) -> bool {
        if !self.database.eq_ignore_ascii_case(&table.database) {
            return false;
        }
        match &self.schema {
            None => true,
            Some(schema) => schema.eq_ignore_ascii_case(&table.schema),
        }
    }
}

impl std::fmt::Display for ScopeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", self.database, schema),
            None => write!(f, "{}", self.database),
        }
    }
}

/// The configured set of permitted scopes.
///
/// Membership is monotone: adding entries only ever widens access. An empty
/// entry set means unrestricted access.
#[derive(Debug, Clone, Default)]
pub struct AllowListPolicy {
    entries: Vec<ScopeEntry>,
}

impl AllowListPolicy {
    /// A policy that permits every scope.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Parse the comma-separated allow-list configuration.
    ///
    /// Surrounding whitespace is trimmed and empty tokens are ignored, so
    /// `"db_a, db_b.schema,"` is fine. A token with more than one dot is a
    /// configuration error and fails startup. `None` or an effectively
    /// empty string yields the unrestricted policy.
    pub fn parse(config: Option<&str>) -> ServerResult<Self> {
        let Some(raw) = config else {
            return Ok(Self::unrestricted());
        };

        let mut entries = Vec::new();
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            entries.push(ScopeEntry::parse(token)?);
        }

        if entries.is_empty() {
            info!("No scope allow-list configured; access is unrestricted");
        } else {
            info!(scopes = entries.len(), "Scope allow-list configured");
        }
        Ok(Self { entries })
    }

    /// True if no scopes are configured (unrestricted mode).
    pub fn is_unrestricted(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide whether a fully qualified table reference falls inside the
    /// policy. Pure function over the immutable entry set.
    pub fn is_allowed(&self, table: &TableIdentifier) -> bool {
        self.entries.is_empty() || self.entries.iter().any(|entry| entry.matches(table))
    }

    /// Number of configured scope entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the entry set is empty (equivalent to unrestricted).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
