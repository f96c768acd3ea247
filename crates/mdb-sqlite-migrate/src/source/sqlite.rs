//! SQLite source reader.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::identifier::{quote_sqlite, quote_sqlite_expr};
use crate::core::native::NativeType;
use crate::core::schema::{Column, Table};
use crate::core::traits::{RowProducer, RowStream, SchemaReader};
use crate::core::value::{Row, SqlValue};
use crate::error::{MigrateError, Result};

/// Reads schema and rows from a SQLite file, opened read-only.
pub struct SqliteReader {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReader {
    /// Open a SQLite source file.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MigrateError::SchemaExtraction(format!(
                "Source database not found: {}",
                path.display()
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;

        info!("Opened SQLite source: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| MigrateError::Io(std::io::Error::other(e)))?
    }
}

/// Translate a declared SQLite column type into a native type.
///
/// Follows SQLite's affinity rules, refined where the declared name says
/// more (BOOLEAN, DATETIME, GUID). An empty declaration has BLOB affinity.
pub fn native_from_declared(declared: &str) -> NativeType {
    let t = declared.trim().to_uppercase();

    if t.is_empty() {
        return NativeType::LongVarBinary;
    }
    if t.contains("BOOL") || t == "BIT" {
        return NativeType::Boolean;
    }
    if t.contains("BIGINT") || t.contains("INT8") {
        return NativeType::BigInt;
    }
    if t.contains("TINYINT") {
        return NativeType::TinyInt;
    }
    if t.contains("SMALLINT") {
        return NativeType::SmallInt;
    }
    if t.contains("INT") {
        return NativeType::Integer;
    }
    if t.contains("GUID") || t.contains("UUID") || t.contains("UNIQUEIDENTIFIER") {
        return NativeType::Guid;
    }
    if t.contains("CLOB") || t == "TEXT" || t.contains("MEMO") {
        return NativeType::LongVarWChar;
    }
    if t.contains("CHAR") || t.contains("TEXT") {
        return NativeType::VarWChar;
    }
    if t.contains("BLOB") || t.contains("BINARY") {
        return NativeType::LongVarBinary;
    }
    if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        return NativeType::Double;
    }
    if t.contains("MONEY") || t.contains("CURRENCY") {
        return NativeType::Currency;
    }
    if t.contains("DATETIME") || t.contains("TIMESTAMP") {
        return NativeType::DbTimeStamp;
    }
    if t.contains("DATE") {
        return NativeType::DbDate;
    }
    if t.contains("TIME") {
        return NativeType::DbTime;
    }
    if t.contains("DEC") {
        return NativeType::Decimal;
    }

    NativeType::Numeric
}

/// SQLite stores defaults as SQL text; strip literal quoting so the value
/// can be re-quoted for the target.
fn unquote_default(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        trimmed[1..trimmed.len() - 1].replace("''", "'")
    } else {
        trimmed.to_string()
    }
}

fn list_tables_sync(conn: &Connection) -> Result<Vec<Table>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(names.into_iter().map(Table::new).collect())
}

/// `(pk index, name)` for every column of a table, in declaration order.
fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT pk, name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Catalog spelling of a table name. SQLite matches identifiers without
/// regard to ASCII case, so `REFERENCES Parent` names table `parent`.
fn resolve_table(conn: &Connection, name: &str) -> rusqlite::Result<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name = ?1 COLLATE NOCASE \
         ORDER BY name = ?1 DESC LIMIT 1",
    )?;
    let mut rows = stmt.query([name])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

fn find_ignore_case<'a>(names: impl IntoIterator<Item = &'a String>, name: &str) -> Option<String> {
    let names: Vec<&String> = names.into_iter().collect();
    names
        .iter()
        .find(|n| n.as_str() == name)
        .or_else(|| names.iter().find(|n| n.eq_ignore_ascii_case(name)))
        .map(|n| n.to_string())
}

fn populate_sync(conn: &Connection, table: &mut Table) -> Result<()> {
    let name = table.name.clone();
    let quoted = quote_sqlite(&name)?;
    let introspection = |e: rusqlite::Error| MigrateError::introspection(&name, e.to_string());

    // Columns
    let sql = format!("PRAGMA table_info({})", quoted);
    let mut stmt = conn.prepare(&sql).map_err(introspection)?;
    let mut rows = stmt.query([]).map_err(introspection)?;
    let mut pk: Vec<(i64, String)> = Vec::new();

    while let Some(row) = rows.next().map_err(introspection)? {
        let cid: i64 = row.get(0).map_err(introspection)?;
        let col_name: String = row.get(1).map_err(introspection)?;
        let declared: Option<String> = row.get(2).map_err(introspection)?;
        let not_null: i64 = row.get(3).map_err(introspection)?;
        let default: Option<String> = row.get(4).map_err(introspection)?;
        let pk_index: i64 = row.get(5).map_err(introspection)?;

        let mut column = Column::new(
            col_name.as_str(),
            cid as i32 + 1,
            native_from_declared(declared.as_deref().unwrap_or("")),
        )
        .nullable(not_null == 0);
        column.default_value = default.as_deref().map(unquote_default);

        table.add_column(column);
        if pk_index > 0 {
            pk.push((pk_index, col_name));
        }
    }
    drop(rows);
    drop(stmt);

    if table.columns().is_empty() {
        return Err(MigrateError::introspection(&name, "table has no columns"));
    }

    // Primary key
    pk.sort_by_key(|(i, _)| *i);
    for (_, col) in &pk {
        table.mark_primary_key(col)?;
    }

    // Foreign keys
    let sql = format!("PRAGMA foreign_key_list({})", quoted);
    let mut stmt = conn.prepare(&sql).map_err(introspection)?;
    let fks = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })
        .map_err(introspection)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(introspection)?;

    for (seq, written_table, written_from, to) in fks {
        let own: Vec<String> = table.columns().iter().map(|c| c.name.clone()).collect();
        let from = find_ignore_case(&own, &written_from).unwrap_or(written_from);

        // A reference to a table that does not exist stays as written; the
        // sorter reports it as dangling.
        let Some(ref_table) = resolve_table(conn, &written_table).map_err(introspection)? else {
            table.mark_foreign_key(&from, written_table, to.unwrap_or_default())?;
            continue;
        };

        let parent = table_columns(conn, &ref_table).map_err(introspection)?;
        let ref_column = match to {
            Some(col) => {
                find_ignore_case(parent.iter().map(|(_, n)| n), &col).unwrap_or(col)
            }
            // REFERENCES parent without a column list means the parent's primary key
            None => {
                let mut pk: Vec<&(i64, String)> = parent.iter().filter(|(k, _)| *k > 0).collect();
                pk.sort_by_key(|(k, _)| *k);
                pk.get(seq.max(0) as usize)
                    .map(|(_, n)| n.clone())
                    .ok_or_else(|| {
                        MigrateError::introspection(
                            &name,
                            format!(
                                "foreign key on '{}' references {} which has no matching primary key column",
                                from, ref_table
                            ),
                        )
                    })?
            }
        };
        table.mark_foreign_key(&from, ref_table, ref_column)?;
    }

    debug!(
        "Loaded {} columns for table {}",
        table.columns().len(),
        table.name
    );
    Ok(())
}

fn read_value(value: ValueRef<'_>, native: NativeType) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) if native == NativeType::Boolean => SqlValue::Bool(i != 0),
        ValueRef::Integer(i) => SqlValue::I64(i),
        ValueRef::Real(f) => SqlValue::F64(f),
        // SQLite does not enforce UTF-8 in TEXT; keep invalid text byte for byte
        ValueRef::Text(s) => match std::str::from_utf8(s) {
            Ok(text) => SqlValue::Text(text.to_string()),
            Err(_) => SqlValue::Bytes(s.to_vec()),
        },
        ValueRef::Blob(b) => SqlValue::Bytes(b.to_vec()),
    }
}

/// Stream every row of `table` into `tx`.
///
/// Returns early without error when the receiver is gone.
fn read_rows(
    conn: &Connection,
    table: &Table,
    tx: &mpsc::Sender<Result<Row>>,
) -> Result<()> {
    let cols: Vec<String> = table
        .columns()
        .iter()
        .map(|c| quote_sqlite_expr(&c.name))
        .collect::<Result<_>>()?;
    let sql = format!("SELECT {} FROM {}", cols.join(", "), quote_sqlite_expr(&table.name)?);
    debug!("{}", sql);

    let names: Arc<[String]> = table.columns().iter().map(|c| c.name.clone()).collect();
    let natives: Vec<NativeType> = table.columns().iter().map(|c| c.native_type).collect();

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(natives.len());
        for (idx, native) in natives.iter().enumerate() {
            values.push(read_value(row.get_ref(idx)?, *native));
        }
        if tx.blocking_send(Ok(Row::new(Arc::clone(&names), values))).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

#[async_trait]
impl SchemaReader for SqliteReader {
    async fn list_tables(&self, schema_filter: Option<&str>) -> Result<Vec<Table>> {
        if let Some(schema) = schema_filter {
            if !schema.eq_ignore_ascii_case("main") {
                return Err(MigrateError::SchemaExtraction(format!(
                    "SQLite sources only have the 'main' schema, got '{}'",
                    schema
                )));
            }
        }

        let tables = self.with_conn(list_tables_sync).await?;
        info!("Found {} tables in SQLite source", tables.len());
        Ok(tables)
    }

    async fn populate_table_definition(&self, table: &mut Table) -> Result<()> {
        let mut owned = Table::new(table.name.clone());
        *table = self
            .with_conn(move |conn| {
                populate_sync(conn, &mut owned)?;
                Ok(owned)
            })
            .await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}

impl RowProducer for SqliteReader {
    fn stream_rows(&self, table: &Table, capacity: usize) -> RowStream {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::clone(&self.conn);
        let table = table.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            if let Err(e) = read_rows(&conn, &table, &tx) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }
}
