//! Error types for snowdoc.

use thiserror::Error;

/// The main error type for snowdoc operations.
#[derive(Debug, Error)]
pub enum SnowError {
    /// A column was redefined with an incompatible type.
    #[error("Conflicting column {column} in {table}: already {existing}, not {requested}")]
    Conflict {
        table: String,
        column: String,
        existing: String,
        requested: String,
    },

    /// Planning or inserting against a fact table with no registered schema.
    #[error("Unknown table: '{0}'")]
    UnknownTable(String),

    /// `create_table` on a table that already exists.
    #[error("Table already exists: '{0}'")]
    TableExists(String),

    /// A selection names a field the fact table has no column for.
    #[error("Unknown field '{field}' in table '{table}'")]
    UnknownField { table: String, field: String },

    /// The document cannot be stored.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnowError {
    /// Create a conflict error for a column redefinition.
    pub fn conflict(
        table: impl Into<String>,
        column: impl Into<String>,
        existing: impl ToString,
        requested: impl ToString,
    ) -> Self {
        Self::Conflict {
            table: table.into(),
            column: column.into(),
            existing: existing.to_string(),
            requested: requested.to_string(),
        }
    }

    /// Create an unknown field error.
    pub fn unknown_field(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            table: table.into(),
            field: field.into(),
        }
    }
}

/// Result type alias for snowdoc operations.
pub type SnowResult<T> = Result<T, SnowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SnowError::conflict("fact", "a.$S", "string", "integer");
        assert_eq!(
            err.to_string(),
            "Conflicting column a.$S in fact: already string, not integer"
        );
    }

    #[test]
    fn test_unknown_field_display() {
        let err = SnowError::unknown_field("fact", "id");
        assert_eq!(err.to_string(), "Unknown field 'id' in table 'fact'");
    }
}
