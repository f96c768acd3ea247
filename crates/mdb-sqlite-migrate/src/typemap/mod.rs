//! Type mapping from native source types to SQLite column types.

use std::fmt;

use serde::Serialize;

use crate::core::native::NativeType;
use crate::core::schema::Column;
use crate::error::{MigrateError, Result};

/// SQLite column type emitted in generated DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetType {
    Boolean,
    Integer,
    Double,
    Blob,
    Text,
    DateTime,
}

impl TargetType {
    /// Type name as written in CREATE TABLE.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Boolean => "BOOLEAN",
            TargetType::Integer => "INTEGER",
            TargetType::Double => "DOUBLE",
            TargetType::Blob => "BLOB",
            TargetType::Text => "TEXT",
            TargetType::DateTime => "DATETIME",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a native type to its SQLite type.
///
/// Returns `None` for types with no storage meaning (Empty, Variant,
/// IDispatch and the other COM plumbing codes).
pub fn map_type(native: NativeType) -> Option<TargetType> {
    use NativeType::*;

    let mapped = match native {
        Boolean => TargetType::Boolean,

        // Integer widths, plus FILETIME which is a 64-bit tick count
        TinyInt | SmallInt | Integer | BigInt | UnsignedTinyInt | UnsignedSmallInt
        | UnsignedInt | UnsignedBigInt | Filetime => TargetType::Integer,

        Currency | Decimal | Numeric | VarNumeric | Single | Double => TargetType::Double,

        Binary | VarBinary | LongVarBinary => TargetType::Blob,

        BStr | Char | WChar | VarChar | LongVarChar | VarWChar | LongVarWChar | Guid => {
            TargetType::Text
        }

        Date | DbDate | DbTime | DbTimeStamp => TargetType::DateTime,

        Empty | IDispatch | Error | Variant | IUnknown | Chapter | PropVariant => return None,
    };

    Some(mapped)
}

/// Map a column's native type, failing with [`MigrateError::UnmappableType`].
pub fn map_column(table: &str, column: &Column) -> Result<TargetType> {
    map_type(column.native_type).ok_or_else(|| MigrateError::UnmappableType {
        table: table.to_string(),
        column: column.name.clone(),
        native_type: column.native_type.to_string(),
    })
}

/// Whether a column default of this type is written as a quoted literal.
pub fn is_literal_type(native: NativeType) -> bool {
    matches!(
        map_type(native),
        Some(TargetType::Blob | TargetType::Text | TargetType::DateTime)
    )
}
