//! Schema and metadata types for database tables and columns.
//!
//! These types provide an engine-neutral representation of schema metadata.
//! Source readers populate them during introspection; after that they are
//! only read.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::native::NativeType;
use crate::error::{MigrateError, Result};

/// A named, ordered collection of tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name (None when the source has no schema concept).
    pub name: Option<String>,

    /// Tables in their current order.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            tables: Vec::new(),
        }
    }

    /// Append a table. Names are not checked for duplicates.
    pub fn add_table(&mut self, table: Table) {
        self.tables.push(table);
    }

    /// Find a table by name.
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find a table by name for mutation.
    pub fn find_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    /// Table names in their current order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the schema has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {}", self.name.as_deref().unwrap_or(""))?;
        writeln!(f, "-----------------------------------")?;
        for table in &self.tables {
            writeln!(f, "{}", table)?;
        }
        Ok(())
    }
}

/// Table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Columns, kept sorted by ordinal position.
    columns: Vec<Column>,
}

impl Table {
    /// Create a table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column, keeping the columns ordered by ordinal position.
    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
        self.columns.sort_by_key(|c| c.ordinal_position);
    }

    /// Columns in ordinal order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Find a column by name.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Find a column by name for mutation.
    pub fn find_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Flag a column as part of the primary key.
    ///
    /// The catalog reported the key, so a missing column means the catalog is
    /// inconsistent with itself.
    pub fn mark_primary_key(&mut self, column: &str) -> Result<()> {
        let table = self.name.clone();
        let col = self.find_column_mut(column).ok_or_else(|| {
            MigrateError::introspection(
                &table,
                format!("primary key column '{}' not found in table columns", column),
            )
        })?;
        col.is_primary_key = true;
        Ok(())
    }

    /// Record a foreign key from `column` to `ref_table`.`ref_column`.
    pub fn mark_foreign_key(
        &mut self,
        column: &str,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Result<()> {
        let table = self.name.clone();
        let col = self.find_column_mut(column).ok_or_else(|| {
            MigrateError::introspection(
                &table,
                format!("foreign key column '{}' not found in table columns", column),
            )
        })?;
        col.foreign_key = Some(ColumnReference {
            table: ref_table.into(),
            column: ref_column.into(),
        });
        Ok(())
    }

    /// Primary key columns in ordinal order.
    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }

    /// Distinct tables referenced by this table's foreign keys, in column order.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        for fk in self.columns.iter().filter_map(|c| c.foreign_key.as_ref()) {
            if !refs.contains(&fk.table.as_str()) {
                refs.push(&fk.table);
            }
        }
        refs
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Table: {}", self.name)?;
        writeln!(f, "===================================")?;
        for column in &self.columns {
            writeln!(f, "{}", column)?;
        }
        Ok(())
    }
}

/// Target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
    /// Referenced table name.
    pub table: String,

    /// Referenced column name.
    pub column: String,
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Catalog description, if any.
    pub description: Option<String>,

    /// Ordinal position in the source catalog (1-based).
    pub ordinal_position: i32,

    /// Native source type.
    pub native_type: NativeType,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Maximum character length for string types.
    pub max_char_length: Option<i32>,

    /// Numeric precision.
    pub numeric_precision: Option<i32>,

    /// Numeric scale.
    pub numeric_scale: Option<i32>,

    /// Fractional seconds precision for date/time types.
    pub datetime_precision: Option<i32>,

    /// Default value literal as reported by the catalog. `Some` means the
    /// column has a default.
    pub default_value: Option<String>,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Foreign key target, if the column references another table.
    pub foreign_key: Option<ColumnReference>,
}

impl Column {
    /// Create a nullable column with no default, key or size metadata.
    pub fn new(name: impl Into<String>, ordinal_position: i32, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            description: None,
            ordinal_position,
            native_type,
            is_nullable: true,
            max_char_length: None,
            numeric_precision: None,
            numeric_scale: None,
            datetime_precision: None,
            default_value: None,
            is_primary_key: false,
            foreign_key: None,
        }
    }

    /// Set nullability.
    pub fn nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    /// Set the default value literal.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Whether the column has a default value.
    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }

    /// Whether the column references another table.
    pub fn has_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = if self.native_type.is_numeric() {
            format!(
                "{},{}",
                self.numeric_precision.unwrap_or(0),
                self.numeric_scale.unwrap_or(0)
            )
        } else {
            self.max_char_length.unwrap_or(0).to_string()
        };
        write!(
            f,
            "{}){}\"{}\":\t{}({})\t [{}]",
            self.ordinal_position,
            if self.is_primary_key { "*" } else { "" },
            self.name,
            self.native_type,
            size,
            self.description.as_deref().unwrap_or(""),
        )?;
        if let Some(default) = &self.default_value {
            write!(f, "\t {{{}}}", default)?;
        }
        if let Some(fk) = &self.foreign_key {
            write!(f, "\n\tFK: {}.{}", fk.table, fk.column)?;
        }
        Ok(())
    }
}
