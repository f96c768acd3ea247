//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration.
    pub source: SourceConfig,

    /// Target database (SQLite) configuration.
    #[serde(default)]
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Microsoft Access database read over ODBC.
    #[default]
    Access,

    /// SQLite database file.
    Sqlite,
}

impl SourceKind {
    /// Engine identifier used in logs and results.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Access => "access",
            SourceKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access" | "mdb" | "accdb" => Ok(SourceKind::Access),
            "sqlite" | "sqlite3" => Ok(SourceKind::Sqlite),
            other => Err(format!(
                "unknown source type '{}' (expected 'access' or 'sqlite')",
                other
            )),
        }
    }
}

/// Source database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source engine (default: access).
    #[serde(default)]
    pub r#type: SourceKind,

    /// Path to the source database file.
    pub path: PathBuf,

    /// Full ODBC connection string, overriding the one built from `path`.
    /// May contain a database password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Only list tables of this schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

// Custom Debug implementation that redacts the connection string
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("path", &self.path)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .field("schema", &self.schema)
            .finish()
    }
}

impl SourceConfig {
    /// ODBC connection string for the Access driver.
    pub fn odbc_connection_string(&self) -> String {
        match &self.connection_string {
            Some(conn) => conn.clone(),
            None => format!(
                "Driver={{Microsoft Access Driver (*.mdb, *.accdb)}};Dbq={};",
                self.path.display()
            ),
        }
    }
}

/// Target database (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Path to the SQLite file (default: source path with a `.db` extension).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Delete an existing target file before migrating (default: false).
    #[serde(default)]
    pub erase: bool,

    /// Enforce foreign keys in the target (default: true).
    #[serde(default = "default_true")]
    pub foreign_keys: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            path: None,
            erase: false,
            foreign_keys: true,
        }
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows between progress markers (default: 100).
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Capacity of the row channel between source and target (default: 1024).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Log the schema dump and generated DDL at info level (default: false).
    #[serde(default)]
    pub verbose: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
            channel_capacity: default_channel_capacity(),
            verbose: false,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_progress_interval() -> u64 {
    100
}

fn default_channel_capacity() -> usize {
    1024
}
