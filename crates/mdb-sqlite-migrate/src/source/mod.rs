//! Source database readers.
//!
//! - [`SqliteReader`]: a SQLite file, through rusqlite
//! - `AccessReader` (feature `access`): an Access database, through ODBC
//!
//! The ODBC catalog reports types as ODBC SQL type codes and delivers
//! values as text; the helpers in this module translate both into the
//! engine-neutral model.

#[cfg(feature = "access")]
mod access;
mod sqlite;

#[cfg(feature = "access")]
pub use access::AccessReader;
pub use sqlite::{native_from_declared, SqliteReader};

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tracing::warn;

use crate::config::{Config, SourceKind};
use crate::core::native::NativeType;
use crate::core::traits::SourceBackend;
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

/// Open the source backend selected by the configuration.
pub fn open_source(config: &Config) -> Result<Arc<dyn SourceBackend>> {
    match config.source.r#type {
        SourceKind::Sqlite => Ok(Arc::new(SqliteReader::open(&config.source.path)?)),
        #[cfg(feature = "access")]
        SourceKind::Access => Ok(Arc::new(AccessReader::new(&config.source)?)),
        #[cfg(not(feature = "access"))]
        SourceKind::Access => Err(MigrateError::Config(
            "Access sources require the 'access' feature (ODBC support)".into(),
        )),
    }
}

/// Translate an ODBC SQL type code (SQLColumns `DATA_TYPE`) into a native type.
///
/// `type_name` (SQLColumns `TYPE_NAME`) separates Access CURRENCY from
/// other exact numerics. Unknown codes become [`NativeType::Variant`],
/// which the type mapper rejects.
pub fn native_from_odbc(code: i16, type_name: &str) -> NativeType {
    match code {
        -7 => NativeType::Boolean,
        -6 => NativeType::UnsignedTinyInt,
        5 => NativeType::SmallInt,
        4 => NativeType::Integer,
        -5 => NativeType::BigInt,
        7 => NativeType::Single,
        6 | 8 => NativeType::Double,
        2 | 3 => {
            let name = type_name.to_uppercase();
            if name == "CURRENCY" || name == "MONEY" {
                NativeType::Currency
            } else if code == 2 {
                NativeType::Numeric
            } else {
                NativeType::Decimal
            }
        }
        1 => NativeType::Char,
        12 => NativeType::VarChar,
        -1 => NativeType::LongVarChar,
        -8 => NativeType::WChar,
        -9 => NativeType::VarWChar,
        -10 => NativeType::LongVarWChar,
        -11 => NativeType::Guid,
        -2 => NativeType::Binary,
        -3 => NativeType::VarBinary,
        -4 => NativeType::LongVarBinary,
        9 | 91 => NativeType::DbDate,
        10 | 92 => NativeType::DbTime,
        11 | 93 => NativeType::DbTimeStamp,
        other => {
            warn!("Unknown ODBC type code {} ({}), recording as Variant", other, type_name);
            NativeType::Variant
        }
    }
}

/// Strip the quotes Access puts around text defaults (`"abc"` becomes `abc`).
pub fn unwrap_default(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\"\"", "\"")
    } else {
        trimmed.to_string()
    }
}

/// Decode a text buffer delivered by ODBC. Bytes that are not UTF-8 are an
/// error rather than being replaced.
pub fn decode_text(column: &str, bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes).map(str::to_string).map_err(|e| {
        MigrateError::SchemaExtraction(format!(
            "Column {} returned text that is not valid UTF-8: {}",
            column, e
        ))
    })
}

/// Convert a text value delivered by ODBC into a typed value.
///
/// Binary columns arrive hex encoded. Text that does not parse as the
/// column's type is an error.
pub fn convert_text(native: NativeType, text: Option<String>) -> Result<SqlValue> {
    let Some(s) = text else {
        return Ok(SqlValue::Null);
    };

    let invalid = |what: &str| {
        MigrateError::SchemaExtraction(format!("Cannot convert {:?} to {} ({})", s, what, native))
    };

    let value = match native {
        NativeType::Boolean => match s.trim().to_lowercase().as_str() {
            "1" | "-1" | "true" | "yes" => SqlValue::Bool(true),
            "0" | "false" | "no" => SqlValue::Bool(false),
            _ => return Err(invalid("boolean")),
        },
        NativeType::TinyInt
        | NativeType::SmallInt
        | NativeType::Integer
        | NativeType::BigInt
        | NativeType::UnsignedTinyInt
        | NativeType::UnsignedSmallInt
        | NativeType::UnsignedInt
        | NativeType::UnsignedBigInt
        | NativeType::Filetime => s
            .trim()
            .parse::<i64>()
            .map(SqlValue::I64)
            .map_err(|_| invalid("integer"))?,
        NativeType::Single | NativeType::Double => s
            .trim()
            .parse::<f64>()
            .map(SqlValue::F64)
            .map_err(|_| invalid("float"))?,
        NativeType::Currency | NativeType::Decimal | NativeType::Numeric | NativeType::VarNumeric => {
            // Remove currency symbols and thousands separators
            let cleaned = s.trim().replace(['$', ','], "");
            Decimal::from_str_exact(&cleaned)
                .or_else(|_| cleaned.parse::<Decimal>())
                .map(SqlValue::Decimal)
                .or_else(|_| cleaned.parse::<f64>().map(SqlValue::F64))
                .map_err(|_| invalid("decimal"))?
        }
        NativeType::Guid => {
            let trimmed = s.trim().trim_start_matches('{').trim_end_matches('}');
            uuid::Uuid::parse_str(trimmed)
                .map(SqlValue::Uuid)
                .map_err(|_| invalid("GUID"))?
        }
        NativeType::Date | NativeType::DbTimeStamp => parse_datetime(&s)
            .map(SqlValue::DateTime)
            .ok_or_else(|| invalid("timestamp"))?,
        NativeType::DbDate => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(SqlValue::Date)
            .or_else(|_| parse_datetime(&s).map(|dt| SqlValue::Date(dt.date())).ok_or(()))
            .map_err(|_| invalid("date"))?,
        NativeType::DbTime => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
            .map(SqlValue::Time)
            .map_err(|_| invalid("time"))?,
        NativeType::Binary | NativeType::VarBinary | NativeType::LongVarBinary => {
            // ODBC returns binary as hex string (e.g., "0xDEADBEEF" or just hex digits)
            let hex_str = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(&s);
            hex::decode(hex_str)
                .map(SqlValue::Bytes)
                .map_err(|_| invalid("binary"))?
        }
        _ => SqlValue::Text(s),
    };

    Ok(value)
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
