//! MS Access source reader over ODBC.
//!
//! Schema comes from the ODBC catalog functions (SQLTables, SQLColumns,
//! SQLPrimaryKeys, SQLForeignKeys). The Access driver does not implement
//! every catalog call; missing key information is logged and the table
//! is read without it.

use std::sync::Arc;

use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{convert_text, decode_text, native_from_odbc, unwrap_default};
use crate::config::SourceConfig;
use crate::core::identifier::{escape, quote_access};
use crate::core::native::NativeType;
use crate::core::schema::{Column, Table};
use crate::core::traits::{RowProducer, RowStream, SchemaReader};
use crate::core::value::Row;
use crate::error::{MigrateError, Result};

const CATALOG_BATCH: usize = 256;
const CATALOG_MAX_TEXT: usize = 4096;
const ROW_BATCH: usize = 64;
const ROW_MAX_TEXT: usize = 256 * 1024;

type TextRows = Vec<Vec<Option<String>>>;

/// Reads an Access database through the ODBC driver manager.
#[derive(Clone)]
pub struct AccessReader {
    env: Arc<Environment>,
    connection_string: Arc<str>,
}

impl AccessReader {
    /// Create the ODBC environment and test the connection.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            MigrateError::SchemaExtraction(format!(
                "Failed to create ODBC environment: {}. \
                 Make sure an ODBC driver manager and the Microsoft Access driver are installed.",
                e
            ))
        })?;

        let connection_string: Arc<str> = config.odbc_connection_string().into();

        // Scope so the connection is dropped before env moves
        {
            let conn = env
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map_err(|e| {
                    MigrateError::SchemaExtraction(format!(
                        "Failed to open Access database {}: {}",
                        config.path.display(),
                        e
                    ))
                })?;
            drop(conn);
        }

        info!("Connected to Access database via ODBC: {}", config.path.display());

        Ok(Self {
            env: Arc::new(env),
            connection_string,
        })
    }

    fn connect(&self) -> Result<odbc_api::Connection<'_>> {
        Ok(self
            .env
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())?)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&AccessReader) -> Result<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(&this))
            .await
            .map_err(|e| MigrateError::Io(std::io::Error::other(e)))?
    }

    fn list_tables_sync(&self, schema_filter: Option<&str>) -> Result<Vec<Table>> {
        let conn = self.connect()?;
        let cursor = conn
            .tables("", schema_filter.unwrap_or(""), "", "TABLE")
            .map_err(|e| MigrateError::SchemaExtraction(format!("SQLTables failed: {}", e)))?;
        let rows = collect_text(cursor, CATALOG_BATCH, CATALOG_MAX_TEXT)?;

        // TABLE_NAME is column 3, TABLE_TYPE column 4
        let tables = rows
            .into_iter()
            .filter(|r| cell(r, 3).is_some_and(|t| t.eq_ignore_ascii_case("TABLE")))
            .filter_map(|r| cell(&r, 2).map(str::to_string))
            .map(Table::new)
            .collect();
        Ok(tables)
    }

    fn populate_sync(&self, table: &mut Table) -> Result<()> {
        let conn = self.connect()?;
        let name = table.name.clone();

        // Columns
        let cursor = conn
            .columns("", "", &name, "")
            .map_err(|e| MigrateError::introspection(&name, format!("SQLColumns failed: {}", e)))?;
        let rows = collect_text(cursor, CATALOG_BATCH, CATALOG_MAX_TEXT)?;

        for (idx, row) in rows.iter().enumerate() {
            let Some(col_name) = cell(row, 3) else {
                continue;
            };
            let code: i16 = cell(row, 4)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or_default();
            let type_name = cell(row, 5).unwrap_or("");
            let ordinal = cell(row, 16)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(idx as i32 + 1);

            let mut column = Column::new(col_name, ordinal, native_from_odbc(code, type_name))
                .nullable(cell(row, 10).map(|s| s.trim() != "0").unwrap_or(true));
            // COLUMN_SIZE is precision for numerics, length otherwise
            let size = parse_num(cell(row, 6));
            if column.native_type.is_numeric() {
                column.numeric_precision = size;
                column.numeric_scale = parse_num(cell(row, 8));
            } else {
                column.max_char_length = size;
            }
            column.description = cell(row, 11).map(str::to_string);
            column.default_value = cell(row, 12).map(unwrap_default);

            table.add_column(column);
        }

        // Primary key
        match conn.primary_keys(None, None, &name) {
            Ok(cursor) => {
                for row in collect_text(cursor, CATALOG_BATCH, CATALOG_MAX_TEXT)? {
                    if let Some(col) = cell(&row, 3) {
                        table.mark_primary_key(col)?;
                    }
                }
            }
            Err(e) => warn!("Primary key lookup not supported for {}: {}", name, e),
        }

        // Foreign keys, child side
        for (fk_column, ref_table, ref_column) in self.foreign_keys(&conn, &name) {
            table.mark_foreign_key(&fk_column, ref_table, ref_column)?;
        }

        debug!(
            "Loaded {} columns for table {}",
            table.columns().len(),
            table.name
        );
        Ok(())
    }

    /// `(fk_column, ref_table, ref_column)` for every foreign key on `table`.
    ///
    /// Falls back to the MSysRelationships system table, which needs read
    /// permission on system objects.
    fn foreign_keys(&self, conn: &odbc_api::Connection<'_>, table: &str) -> Vec<(String, String, String)> {
        let catalog = conn
            .foreign_keys("", "", "", "", "", table)
            .map_err(|e| e.to_string())
            .and_then(|cursor| {
                collect_text(cursor, CATALOG_BATCH, CATALOG_MAX_TEXT).map_err(|e| e.to_string())
            });

        match catalog {
            Ok(rows) => {
                // PKTABLE_NAME 3, PKCOLUMN_NAME 4, FKCOLUMN_NAME 8
                return rows
                    .iter()
                    .filter_map(|r| {
                        Some((
                            cell(r, 7)?.to_string(),
                            cell(r, 2)?.to_string(),
                            cell(r, 3)?.to_string(),
                        ))
                    })
                    .collect();
            }
            Err(e) => debug!("SQLForeignKeys unavailable for {}: {}", table, e),
        }

        let sql = format!(
            "SELECT szColumn, szReferencedObject, szReferencedColumn \
             FROM MSysRelationships WHERE szObject = {}",
            escape(table)
        );
        let relationships = conn
            .execute(&sql, ())
            .map_err(|e| e.to_string())
            .and_then(|cursor| match cursor {
                Some(cursor) => {
                    collect_text(cursor, CATALOG_BATCH, CATALOG_MAX_TEXT).map_err(|e| e.to_string())
                }
                None => Ok(Vec::new()),
            });

        match relationships {
            Ok(rows) => rows
                .iter()
                .filter_map(|r| {
                    Some((
                        cell(r, 0)?.to_string(),
                        cell(r, 1)?.to_string(),
                        cell(r, 2)?.to_string(),
                    ))
                })
                .collect(),
            Err(e) => {
                warn!("Foreign keys of {} could not be read: {}", table, e);
                Vec::new()
            }
        }
    }

    fn read_rows(&self, table: &Table, tx: &mpsc::Sender<Result<Row>>) -> Result<()> {
        let cols: Vec<String> = table
            .columns()
            .iter()
            .map(|c| quote_access(&c.name))
            .collect::<Result<_>>()?;
        let sql = format!("SELECT {} FROM {}", cols.join(", "), quote_access(&table.name)?);
        debug!("{}", sql);

        let names: Arc<[String]> = table.columns().iter().map(|c| c.name.clone()).collect();
        let natives: Vec<NativeType> = table.columns().iter().map(|c| c.native_type).collect();

        let conn = self.connect()?;
        let source_err = |e: odbc_api::Error| MigrateError::SchemaExtraction(format!("{} - SQL: {}", e, sql));

        let Some(mut cursor) = conn.execute(&sql, ()).map_err(source_err)? else {
            return Ok(());
        };
        let mut buffers =
            TextRowSet::for_cursor(ROW_BATCH, &mut cursor, Some(ROW_MAX_TEXT)).map_err(source_err)?;
        let mut row_cursor = cursor.bind_buffer(&mut buffers).map_err(source_err)?;

        while let Some(batch) = row_cursor.fetch_with_truncation_check(true).map_err(source_err)? {
            for row_idx in 0..batch.num_rows() {
                let mut values = Vec::with_capacity(natives.len());
                for (col_idx, native) in natives.iter().enumerate() {
                    let text = batch
                        .at(col_idx, row_idx)
                        .map(|bytes| decode_text(&names[col_idx], bytes))
                        .transpose()?;
                    values.push(convert_text(*native, text)?);
                }
                if tx.blocking_send(Ok(Row::new(Arc::clone(&names), values))).is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn cell(row: &[Option<String>], idx: usize) -> Option<&str> {
    row.get(idx).and_then(|v| v.as_deref())
}

fn parse_num(value: Option<&str>) -> Option<i32> {
    value.and_then(|s| s.trim().parse().ok())
}

/// Drain a cursor into rows of optional text.
fn collect_text(mut cursor: impl Cursor, batch_size: usize, max_text: usize) -> Result<TextRows> {
    let fetch_err = |e: odbc_api::Error| MigrateError::SchemaExtraction(format!("ODBC fetch failed: {}", e));

    let num_cols = cursor.num_result_cols().map_err(fetch_err)? as usize;
    let mut buffers =
        TextRowSet::for_cursor(batch_size, &mut cursor, Some(max_text)).map_err(fetch_err)?;
    let mut row_cursor = cursor.bind_buffer(&mut buffers).map_err(fetch_err)?;

    let mut rows = Vec::new();
    while let Some(batch) = row_cursor.fetch().map_err(fetch_err)? {
        for row_idx in 0..batch.num_rows() {
            let row = (0..num_cols)
                .map(|col_idx| {
                    batch
                        .at(col_idx, row_idx)
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                })
                .collect();
            rows.push(row);
        }
    }
    Ok(rows)
}

#[async_trait]
impl SchemaReader for AccessReader {
    async fn list_tables(&self, schema_filter: Option<&str>) -> Result<Vec<Table>> {
        let filter = schema_filter.map(str::to_string);
        let tables = self
            .blocking(move |this| this.list_tables_sync(filter.as_deref()))
            .await?;
        info!("Found {} tables in Access source", tables.len());
        Ok(tables)
    }

    async fn populate_table_definition(&self, table: &mut Table) -> Result<()> {
        let owned = Table::new(table.name.clone());
        *table = self
            .blocking(move |this| {
                let mut owned = owned;
                this.populate_sync(&mut owned)?;
                Ok(owned)
            })
            .await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "access"
    }
}

impl RowProducer for AccessReader {
    fn stream_rows(&self, table: &Table, capacity: usize) -> RowStream {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let this = self.clone();
        let table = table.clone();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = this.read_rows(&table, &tx) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }
}
