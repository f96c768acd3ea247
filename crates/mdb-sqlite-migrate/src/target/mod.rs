//! SQLite target database operations.
//!
//! Tables are created from the schema model with inline column constraints
//! and a trailing composite primary key. Each table's rows are inserted
//! through one prepared statement inside one transaction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::{escape, parameter_name, quote_sqlite, validate_default_expression};
use crate::core::native::NativeType;
use crate::core::schema::{Column, Table};
use crate::core::traits::{CopyOptions, ProgressEvent, RowConsumer, RowStream, SchemaWriter};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::typemap::{is_literal_type, map_column};

/// SQLite target writer.
///
/// The connection is shared behind a mutex; every operation takes the lock
/// on a blocking thread.
pub struct SqliteWriter {
    conn: Arc<Mutex<Connection>>,
    verbose: bool,
}

impl SqliteWriter {
    /// Open (or create) the target file.
    ///
    /// When `config.erase` is set an existing file is deleted first.
    pub fn open(path: &Path, config: &TargetConfig) -> Result<Self> {
        if config.erase && path.exists() {
            info!("Erasing existing target {}", path.display());
            std::fs::remove_file(path)?;
        }

        let conn = Connection::open(path)?;
        Self::configure(&conn, config.foreign_keys)?;

        info!("Opened SQLite target: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            verbose: false,
        })
    }

    /// Open a private in-memory target.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn, true)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            verbose: false,
        })
    }

    /// Log generated DDL at info level instead of debug.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn configure(conn: &Connection, foreign_keys: bool) -> Result<()> {
        // PRAGMA commands return results, so use pragma_update
        conn.pragma_update(None, "foreign_keys", if foreign_keys { "ON" } else { "OFF" })?;
        Ok(())
    }

    /// Count the rows of a target table.
    pub async fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_sqlite(table)?);
        let conn = Arc::clone(&self.conn);
        let count: i64 = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            conn.query_row(&sql, [], |row| row.get(0))
        })
        .await
        .map_err(|e| MigrateError::Io(std::io::Error::other(e)))??;
        Ok(count.max(0) as u64)
    }
}

/// Generate the CREATE TABLE statement for a table.
pub fn create_table_sql(table: &Table) -> Result<String> {
    let mut clauses = Vec::with_capacity(table.columns().len() + 1);

    for col in table.columns() {
        clauses.push(column_clause(table, col)?);
    }

    let pk: Vec<String> = table
        .primary_key()
        .map(|c| quote_sqlite(&c.name))
        .collect::<Result<_>>()?;
    if !pk.is_empty() {
        clauses.push(format!("PRIMARY KEY({})", pk.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_sqlite(&table.name)?,
        clauses.join(", ")
    ))
}

fn column_clause(table: &Table, col: &Column) -> Result<String> {
    let sql_type = map_column(&table.name, col)?;
    let mut clause = format!("{} {}", quote_sqlite(&col.name)?, sql_type);

    if !col.is_nullable {
        clause.push_str(" NOT NULL");
    }

    if let Some(default) = &col.default_value {
        if is_literal_type(col.native_type) {
            clause.push_str(" DEFAULT ");
            clause.push_str(&escape(default));
        } else {
            let raw = default.trim();
            if !raw.is_empty() {
                validate_default_expression(raw)?;
                clause.push_str(" DEFAULT ");
                clause.push_str(&raw_default(col.native_type == NativeType::Boolean, raw));
            }
        }
    }

    if let Some(fk) = &col.foreign_key {
        clause.push_str(&format!(
            " REFERENCES {}({})",
            quote_sqlite(&fk.table)?,
            quote_sqlite(&fk.column)?
        ));
    }

    Ok(clause)
}

/// Access reports boolean defaults as Yes/No or -1/0.
fn raw_default(boolean: bool, raw: &str) -> String {
    if boolean {
        match raw.to_lowercase().as_str() {
            "yes" | "true" | "on" | "-1" | "1" => return "1".to_string(),
            "no" | "false" | "off" | "0" => return "0".to_string(),
            _ => {}
        }
    }
    raw.to_string()
}

/// Generate the parameterized INSERT statement for a table.
pub fn insert_sql(table: &Table) -> Result<String> {
    let cols: Vec<String> = table
        .columns()
        .iter()
        .map(|c| quote_sqlite(&c.name))
        .collect::<Result<_>>()?;
    let params: Vec<String> = table
        .columns()
        .iter()
        .map(|c| parameter_name(&c.name))
        .collect();

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_sqlite(&table.name)?,
        cols.join(", "),
        params.join(", ")
    ))
}

/// Convert a value for binding to SQLite.
fn to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::I64(i) => Value::Integer(*i),
        SqlValue::F64(f) => Value::Real(*f),
        SqlValue::Decimal(d) => {
            use rust_decimal::prelude::ToPrimitive;
            match d.to_f64() {
                Some(f) => Value::Real(f),
                None => Value::Text(d.to_string()),
            }
        }
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bytes(b) => Value::Blob(b.clone()),
        SqlValue::Uuid(u) => Value::Text(u.hyphenated().to_string()),
        SqlValue::DateTime(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
    }
}

/// Insert all rows of one table inside a single transaction.
///
/// Returning early drops the transaction, which rolls it back.
fn copy_rows(
    conn: &mut Connection,
    table: &Table,
    rows: &mut RowStream,
    opts: &CopyOptions,
) -> Result<u64> {
    let sql = insert_sql(table)?;
    let fail = |row: u64, message: String| MigrateError::data_copy(&table.name, row, &sql, message);

    let tx = conn.transaction().map_err(|e| fail(0, e.to_string()))?;
    let copied = {
        let mut stmt = tx.prepare(&sql).map_err(|e| fail(0, e.to_string()))?;

        let mut bindings = Vec::with_capacity(table.columns().len());
        for col in table.columns() {
            let name = parameter_name(&col.name);
            let idx = stmt
                .parameter_index(&name)
                .map_err(|e| fail(0, e.to_string()))?
                .ok_or_else(|| fail(0, format!("parameter {} not found", name)))?;
            bindings.push((col.name.as_str(), idx));
        }

        let interval = opts.progress_interval.max(1);
        let mut count: u64 = 0;
        while let Some(item) = rows.blocking_recv() {
            if opts.cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            let row_no = count + 1;
            let row = item.map_err(|e| fail(row_no, format!("source read failed: {}", e)))?;

            for (name, idx) in &bindings {
                let value = row
                    .get(name)
                    .ok_or_else(|| fail(row_no, format!("row has no value for column {}", name)))?;
                stmt.raw_bind_parameter(*idx, to_sqlite_value(value))
                    .map_err(|e| fail(row_no, e.to_string()))?;
            }
            stmt.raw_execute().map_err(|e| fail(row_no, e.to_string()))?;

            count = row_no;
            if count % interval == 0 {
                debug!("{}: {} rows", table.name, count);
                opts.emit(ProgressEvent::RowsCopied {
                    table: table.name.clone(),
                    rows: count,
                });
            }
        }
        count
    };

    if opts.cancel.is_cancelled() {
        return Err(MigrateError::Cancelled);
    }

    tx.commit().map_err(|e| fail(copied, e.to_string()))?;
    Ok(copied)
}

#[async_trait]
impl SchemaWriter for SqliteWriter {
    async fn create_table(&self, table: &Table) -> Result<()> {
        let ddl = create_table_sql(table)?;
        if self.verbose {
            info!("{}", ddl);
        } else {
            debug!("{}", ddl);
        }

        let conn = Arc::clone(&self.conn);
        let name = table.name.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            conn.execute_batch(&ddl)
                .map_err(|e| MigrateError::SchemaCreation {
                    table: name,
                    statement: ddl.clone(),
                    message: e.to_string(),
                })
        })
        .await
        .map_err(|e| MigrateError::Io(std::io::Error::other(e)))??;

        debug!("Created table {}", table.name);
        Ok(())
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}

#[async_trait]
impl RowConsumer for SqliteWriter {
    async fn copy_table(
        &self,
        table: &Table,
        mut rows: RowStream,
        opts: &CopyOptions,
    ) -> Result<u64> {
        let conn = Arc::clone(&self.conn);
        let owned_table = table.clone();
        let owned_opts = opts.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            let result = copy_rows(&mut conn, &owned_table, &mut rows, &owned_opts);
            // Stop the producer if we bailed out early.
            rows.close();
            result
        })
        .await
        .map_err(|e| MigrateError::Io(std::io::Error::other(e)))?;

        if let Err(e) = &result {
            warn!("Rolled back table {}: {}", table.name, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Row;
    use tokio::sync::mpsc;

    fn parent() -> Table {
        let mut t = Table::new("parent");
        t.add_column(Column::new("id", 1, NativeType::Integer).nullable(false));
        t.add_column(Column::new("name", 2, NativeType::VarWChar));
        t.mark_primary_key("id").unwrap();
        t
    }

    fn child() -> Table {
        let mut t = Table::new("child");
        t.add_column(Column::new("id", 1, NativeType::Integer).nullable(false));
        t.add_column(Column::new("parent_id", 2, NativeType::Integer));
        t.add_column(Column::new("label", 3, NativeType::VarWChar).with_default("n/a"));
        t.mark_primary_key("id").unwrap();
        t.mark_foreign_key("parent_id", "parent", "id").unwrap();
        t
    }

    fn stream(table: &Table, rows: Vec<Vec<SqlValue>>) -> RowStream {
        let columns: Arc<[String]> = table.columns().iter().map(|c| c.name.clone()).collect();
        let (tx, rx) = mpsc::channel(rows.len().max(1));
        for values in rows {
            tx.try_send(Ok(Row::new(Arc::clone(&columns), values))).unwrap();
        }
        rx
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql(&child()).unwrap(),
            "CREATE TABLE 'child' ('id' INTEGER NOT NULL, 'parent_id' INTEGER \
             REFERENCES 'parent'('id'), 'label' TEXT DEFAULT 'n/a', PRIMARY KEY('id'))"
        );
    }

    #[test]
    fn test_create_table_sql_composite_key_and_defaults() {
        let mut t = Table::new("O'Lines");
        t.add_column(Column::new("order", 1, NativeType::Integer));
        t.add_column(Column::new("line", 2, NativeType::SmallInt));
        t.add_column(Column::new("qty", 3, NativeType::Double).with_default("1.5"));
        t.add_column(Column::new("shipped", 4, NativeType::Boolean).with_default("No"));
        t.add_column(Column::new("note", 5, NativeType::WChar).with_default("it's"));
        t.mark_primary_key("order").unwrap();
        t.mark_primary_key("line").unwrap();

        let sql = create_table_sql(&t).unwrap();
        assert!(sql.starts_with("CREATE TABLE 'O''Lines' ("));
        assert!(sql.contains("'qty' DOUBLE DEFAULT 1.5"));
        assert!(sql.contains("'shipped' BOOLEAN DEFAULT 0"));
        assert!(sql.contains("'note' TEXT DEFAULT 'it''s'"));
        assert!(sql.ends_with("PRIMARY KEY('order', 'line'))"));
    }

    #[test]
    fn test_create_table_sql_unmappable() {
        let mut t = Table::new("odd");
        t.add_column(Column::new("v", 1, NativeType::Variant));
        assert!(matches!(
            create_table_sql(&t),
            Err(MigrateError::UnmappableType { .. })
        ));
    }

    #[test]
    fn test_create_table_sql_rejects_injected_default() {
        let mut t = Table::new("x");
        t.add_column(Column::new("n", 1, NativeType::Integer).with_default("0); DROP TABLE y; --"));
        assert!(create_table_sql(&t).is_err());
    }

    #[test]
    fn test_insert_sql_uses_mangled_parameters() {
        assert_eq!(
            insert_sql(&parent()).unwrap(),
            "INSERT INTO 'parent' ('id', 'name') VALUES (@00640069, @0065006d0061006e)"
        );
    }

    #[tokio::test]
    async fn test_copy_table_commits() {
        let writer = SqliteWriter::open_in_memory().unwrap();
        let table = parent();
        writer.create_table(&table).await.unwrap();

        let rows = stream(
            &table,
            vec![
                vec![SqlValue::I64(1), "a".into()],
                vec![SqlValue::I64(2), SqlValue::Null],
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let opts = CopyOptions {
            progress: Some(tx),
            progress_interval: 1,
            ..CopyOptions::default()
        };

        let copied = writer.copy_table(&table, rows, &opts).await.unwrap();
        assert_eq!(copied, 2);
        assert_eq!(writer.row_count("parent").await.unwrap(), 2);
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::RowsCopied {
                table: "parent".into(),
                rows: 1
            })
        );
    }

    #[tokio::test]
    async fn test_copy_table_rolls_back_on_failure() {
        let writer = SqliteWriter::open_in_memory().unwrap();
        let table = parent();
        writer.create_table(&table).await.unwrap();

        // Row 3 repeats a primary key.
        let rows = stream(
            &table,
            vec![
                vec![SqlValue::I64(1), "a".into()],
                vec![SqlValue::I64(2), "b".into()],
                vec![SqlValue::I64(1), "dup".into()],
            ],
        );
        let err = writer
            .copy_table(&table, rows, &CopyOptions::default())
            .await
            .unwrap_err();

        match err {
            MigrateError::DataCopy { table, row, statement, .. } => {
                assert_eq!(table, "parent");
                assert_eq!(row, 3);
                assert!(statement.starts_with("INSERT INTO 'parent'"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(writer.row_count("parent").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_copy_table_cancelled_rolls_back() {
        let writer = SqliteWriter::open_in_memory().unwrap();
        let table = parent();
        writer.create_table(&table).await.unwrap();

        let rows = stream(&table, vec![vec![SqlValue::I64(1), "a".into()]]);
        let opts = CopyOptions::default();
        opts.cancel.cancel();

        let err = writer.copy_table(&table, rows, &opts).await.unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
        assert_eq!(writer.row_count("parent").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_table_reports_statement() {
        let writer = SqliteWriter::open_in_memory().unwrap();
        writer.create_table(&parent()).await.unwrap();

        let err = writer.create_table(&parent()).await.unwrap_err();
        match err {
            MigrateError::SchemaCreation { table, statement, .. } => {
                assert_eq!(table, "parent");
                assert!(statement.starts_with("CREATE TABLE 'parent'"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_value_binding() {
        assert_eq!(to_sqlite_value(&SqlValue::Bool(true)), Value::Integer(1));
        assert_eq!(
            to_sqlite_value(&SqlValue::Decimal(rust_decimal::Decimal::new(25, 1))),
            Value::Real(2.5)
        );
        let date = chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            to_sqlite_value(&SqlValue::Date(date)),
            Value::Text("2024-02-29".into())
        );
    }
}
