//! Backend capabilities used by the migration engine.
//!
//! A source backend is a [`SchemaReader`] plus a [`RowProducer`]; a target
//! backend is a [`SchemaWriter`] plus a [`RowConsumer`]. Each capability is
//! a narrow trait, so a backend implements only the side it supports.
//!
//! Rows travel from producer to consumer through a bounded channel
//! ([`RowStream`]). The producer fills it from a background task and the
//! channel applies backpressure when the consumer falls behind.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::{MigrateError, Result};

use super::schema::{Schema, Table};
use super::value::Row;

/// Forward-only stream of rows for one table.
///
/// Finite and not restartable. A source failure arrives as an `Err` item,
/// after which the producer sends nothing more.
pub type RowStream = mpsc::Receiver<Result<Row>>;

/// Read schema metadata from a source database.
#[async_trait]
pub trait SchemaReader: Send + Sync {
    /// List the tables of the source, names only.
    ///
    /// `schema_filter` restricts the listing to one schema on engines that
    /// have schemas.
    async fn list_tables(&self, schema_filter: Option<&str>) -> Result<Vec<Table>>;

    /// Fill in a table's columns, primary key and foreign keys.
    async fn populate_table_definition(&self, table: &mut Table) -> Result<()>;

    /// Source engine identifier (e.g., "access", "sqlite").
    fn db_type(&self) -> &str;
}

/// Stream rows out of a source table.
pub trait RowProducer: Send + Sync {
    /// Start streaming every row of `table`, columns in table order.
    ///
    /// The producer spawns a task that feeds a channel of `capacity` rows
    /// and returns the receiving end immediately.
    fn stream_rows(&self, table: &Table, capacity: usize) -> RowStream;
}

/// Outcome of creating every table of a schema.
#[derive(Debug, Default)]
pub struct SchemaReport {
    /// Tables created, in creation order.
    pub created: Vec<String>,

    /// Tables not created, with the reason.
    pub failed: Vec<(String, MigrateError)>,
}

impl SchemaReport {
    /// Whether `table` was created.
    pub fn is_created(&self, table: &str) -> bool {
        self.created.iter().any(|t| t == table)
    }
}

/// Create tables in a target database.
#[async_trait]
pub trait SchemaWriter: Send + Sync {
    /// Create one table.
    async fn create_table(&self, table: &Table) -> Result<()>;

    /// Target engine identifier (e.g., "sqlite").
    fn db_type(&self) -> &str;

    /// Create every table of `schema`, in the schema's order.
    ///
    /// A table that fails to create is reported and skipped. Tables whose
    /// foreign keys reference a table that was not created are skipped with
    /// [`MigrateError::DependencyFailed`], which cascades to their own
    /// dependents. Errors that are not about one table (lost connection,
    /// cancellation) abort and are returned.
    async fn clone_schema(&self, schema: &Schema) -> Result<SchemaReport> {
        let mut report = SchemaReport::default();
        let mut missing: HashSet<String> = HashSet::new();

        for table in &schema.tables {
            let blocked = table
                .referenced_tables()
                .into_iter()
                .find(|r| *r != table.name && missing.contains(*r))
                .map(str::to_string);

            if let Some(dependency) = blocked {
                warn!(
                    "Skipping table {}: referenced table {} was not created",
                    table.name, dependency
                );
                missing.insert(table.name.clone());
                report.failed.push((
                    table.name.clone(),
                    MigrateError::DependencyFailed {
                        table: table.name.clone(),
                        dependency,
                    },
                ));
                continue;
            }

            match self.create_table(table).await {
                Ok(()) => report.created.push(table.name.clone()),
                Err(e @ MigrateError::UnmappableType { .. })
                | Err(e @ MigrateError::SchemaCreation { .. })
                | Err(e @ MigrateError::Config(_)) => {
                    error!("Failed to create table {}: {}", table.name, e);
                    missing.insert(table.name.clone());
                    report.failed.push((table.name.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

/// Progress notifications emitted while copying.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A table copy began.
    TableStarted { table: String },

    /// Another batch of rows was inserted (not yet committed).
    RowsCopied { table: String, rows: u64 },

    /// A table copy committed.
    TableCompleted { table: String, rows: u64 },

    /// A table copy was rolled back.
    TableFailed { table: String, error: String },
}

/// Options for one table copy.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Checked before every row; a cancelled copy rolls back.
    pub cancel: CancellationToken,

    /// Progress sink.
    pub progress: Option<mpsc::UnboundedSender<ProgressEvent>>,

    /// Rows between [`ProgressEvent::RowsCopied`] events.
    pub progress_interval: u64,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: None,
            progress_interval: 100,
        }
    }
}

impl CopyOptions {
    /// Send a progress event if anyone is listening.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // Receiver gone just means nobody is watching any more.
            let _ = tx.send(event);
        }
    }
}

/// Insert streamed rows into a target table.
#[async_trait]
pub trait RowConsumer: Send + Sync {
    /// Insert every row of `rows` into `table` inside one transaction.
    ///
    /// Commits when the stream is exhausted and returns the number of rows
    /// inserted. Any failure rolls the whole table back.
    async fn copy_table(&self, table: &Table, rows: RowStream, opts: &CopyOptions) -> Result<u64>;
}

/// A complete source backend.
pub trait SourceBackend: SchemaReader + RowProducer {}

impl<T: SchemaReader + RowProducer> SourceBackend for T {}

/// A complete target backend.
pub trait TargetBackend: SchemaWriter + RowConsumer {}

impl<T: SchemaWriter + RowConsumer> TargetBackend for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::native::NativeType;
    use crate::core::schema::Column;
    use parking_lot::Mutex;

    struct RecordingWriter {
        fail: &'static str,
        created: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SchemaWriter for RecordingWriter {
        async fn create_table(&self, table: &Table) -> Result<()> {
            if table.name == self.fail {
                return Err(MigrateError::SchemaCreation {
                    table: table.name.clone(),
                    statement: "CREATE TABLE ...".into(),
                    message: "boom".into(),
                });
            }
            self.created.lock().push(table.name.clone());
            Ok(())
        }

        fn db_type(&self) -> &str {
            "mock"
        }
    }

    fn table(name: &str, refs: &[&str]) -> Table {
        let mut t = Table::new(name);
        t.add_column(Column::new("id", 1, NativeType::Integer));
        for (i, r) in refs.iter().enumerate() {
            let col = format!("{}_id", r);
            t.add_column(Column::new(col.as_str(), i as i32 + 2, NativeType::Integer));
            t.mark_foreign_key(&col, *r, "id").unwrap();
        }
        t
    }

    #[tokio::test]
    async fn test_clone_schema_cascades_failures() {
        let mut schema = Schema::new(None);
        schema.add_table(table("a", &[]));
        schema.add_table(table("b", &["a"]));
        schema.add_table(table("c", &["b"]));
        schema.add_table(table("d", &[]));

        let writer = RecordingWriter {
            fail: "a",
            created: Mutex::new(Vec::new()),
        };
        let report = writer.clone_schema(&schema).await.unwrap();

        assert_eq!(report.created, vec!["d"]);
        assert_eq!(*writer.created.lock(), vec!["d"]);
        assert_eq!(report.failed.len(), 3);
        assert!(matches!(report.failed[0].1, MigrateError::SchemaCreation { .. }));
        assert!(matches!(
            &report.failed[2].1,
            MigrateError::DependencyFailed { table, dependency } if table == "c" && dependency == "b"
        ));
        assert!(report.is_created("d"));
        assert!(!report.is_created("b"));
    }

    #[tokio::test]
    async fn test_clone_schema_self_reference_not_blocked() {
        let mut schema = Schema::new(None);
        schema.add_table(table("tree", &["tree"]));

        let writer = RecordingWriter {
            fail: "",
            created: Mutex::new(Vec::new()),
        };
        let report = writer.clone_schema(&schema).await.unwrap();
        assert_eq!(report.created, vec!["tree"]);
    }

    #[test]
    fn test_progress_event_json() {
        let event = ProgressEvent::RowsCopied {
            table: "orders".into(),
            rows: 200,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"rows_copied","table":"orders","rows":200}"#);
    }
}
