//! # mdb-sqlite-migrate
//!
//! Migrate a Microsoft Access database (or another SQLite database) into
//! a SQLite file: schema first, then data.
//!
//! - **Dependency ordering**: tables are created after the tables their
//!   foreign keys reference; cycles are reported, never silently dropped
//! - **Per-table transactions**: each table's rows commit together or not at all
//! - **Best effort across tables**: one failing table does not stop the run
//! - **Type mapping** from the closed set of Access/OLE DB types to SQLite
//!
//! ## Example
//!
//! ```rust,no_run
//! use mdb_sqlite_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let result = orchestrator.run(CancellationToken::new()).await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, SourceKind, TargetConfig};
pub use crate::core::{
    Column, CopyOptions, NativeType, ProgressEvent, Row, Schema, SqlValue, Table,
};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    MigrationPlan, MigrationResult, Orchestrator, Phase, TableOutcome, TableStatus,
};
pub use source::SqliteReader;
pub use target::SqliteWriter;
pub use typemap::{map_type, TargetType};
