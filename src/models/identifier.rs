//! Fully qualified table identifiers.

use crate::error::ServerError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fully qualified `database.schema.table` reference.
///
/// All three parts are non-empty by construction, so a partially qualified
/// name is never representable in this type. The original casing is kept;
/// the allow-list compares case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TableIdentifier {
    /// Database (catalog) name
    pub database: String,
    /// Schema name within the database
    pub schema: String,
    /// Table name within the schema
    pub table: String,
}

impl TableIdentifier {
    /// Build an identifier from three parts, rejecting empty ones.
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, ServerError> {
        let ident = Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        };
        if ident.database.is_empty() || ident.schema.is_empty() || ident.table.is_empty() {
            return Err(ServerError::malformed_identifier(ident.to_string()));
        }
        Ok(ident)
    }

    /// The `database.schema` scope this table falls under.
    pub fn scope(&self) -> String {
        format!("{}.{}", self.database, self.schema)
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// Strip one layer of SQL identifier quoting (`"name"` or `` `name` ``).
fn unquote(part: &str) -> &str {
    let bytes = part.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'`' && last == b'`') {
            return &part[1..part.len() - 1];
        }
    }
    part
}

impl FromStr for TableIdentifier {
    type Err = ServerError;

    /// Parse a raw `database.schema.table` string. Fails with
    /// `MalformedIdentifier` unless exactly three non-empty dot-separated
    /// parts are present.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split('.').map(unquote).collect();
        match parts.as_slice() {
            [database, schema, table]
                if !database.is_empty() && !schema.is_empty() && !table.is_empty() =>
            {
                Ok(Self {
                    database: database.to_string(),
                    schema: schema.to_string(),
                    table: table.to_string(),
                })
            }
            _ => Err(ServerError::malformed_identifier(trimmed)),
        }
    }
}
