//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite error, from either the SQLite source or the target
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// ODBC driver error from the Access source
    #[cfg(feature = "access")]
    #[error("ODBC error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// The source schema could not be listed at all
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Column or key metadata for one table could not be read
    #[error("Introspection failed for table {table}: {message}")]
    Introspection { table: String, message: String },

    /// A column's native type has no target equivalent
    #[error("Unmappable type {native_type} for column {table}.{column}")]
    UnmappableType {
        table: String,
        column: String,
        native_type: String,
    },

    /// CREATE TABLE failed
    #[error("Failed to create table {table}: {message}\n  Statement: {statement}")]
    SchemaCreation {
        table: String,
        statement: String,
        message: String,
    },

    /// A table was not created because a table it references was not created
    #[error("Table {table} not created: referenced table {dependency} was not created")]
    DependencyFailed { table: String, dependency: String },

    /// Data copy failed and the table's transaction was rolled back
    #[error("Copy failed for table {table} at row {row}: {message}\n  Statement: {statement}")]
    DataCopy {
        table: String,
        row: u64,
        statement: String,
        message: String,
    },

    /// Tables left out of the emission order (cycles or dangling references)
    #[error("Unresolved foreign key dependencies, tables excluded: {}", .tables.join(", "))]
    DependencyCycle { tables: Vec<String> },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

/// Process exit codes reported by the CLI.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_SOURCE_ERROR: u8 = 2;
pub const EXIT_TARGET_ERROR: u8 = 3;
pub const EXIT_COPY_ERROR: u8 = 4;
pub const EXIT_DEPENDENCY_ERROR: u8 = 5;
pub const EXIT_CANCELLED: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;

impl MigrateError {
    /// Create an Introspection error for a table.
    pub fn introspection(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Introspection {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a DataCopy error.
    pub fn data_copy(
        table: impl Into<String>,
        row: u64,
        statement: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::DataCopy {
            table: table.into(),
            row,
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            #[cfg(feature = "access")]
            MigrateError::Odbc(_) => EXIT_SOURCE_ERROR,
            MigrateError::SchemaExtraction(_) | MigrateError::Introspection { .. } => {
                EXIT_SOURCE_ERROR
            }
            MigrateError::Sqlite(_)
            | MigrateError::UnmappableType { .. }
            | MigrateError::SchemaCreation { .. }
            | MigrateError::DependencyFailed { .. } => EXIT_TARGET_ERROR,
            MigrateError::DataCopy { .. } => EXIT_COPY_ERROR,
            MigrateError::DependencyCycle { .. } => EXIT_DEPENDENCY_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
