//! Native column types reported by the source catalog.
//!
//! The enumeration follows the OLE DB type codes used by the Access catalog
//! (`DATA_TYPE` in the columns rowset). Source readers that speak another
//! catalog dialect (ODBC, SQLite declared types) translate into this set so
//! the type mapper only ever sees one closed vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source column type, keyed by its OLE DB code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeType {
    Empty,
    SmallInt,
    Integer,
    Single,
    Double,
    Currency,
    Date,
    BStr,
    IDispatch,
    Error,
    Boolean,
    Variant,
    IUnknown,
    Decimal,
    TinyInt,
    UnsignedTinyInt,
    UnsignedSmallInt,
    UnsignedInt,
    BigInt,
    UnsignedBigInt,
    Filetime,
    Guid,
    Binary,
    Char,
    WChar,
    Numeric,
    DbDate,
    DbTime,
    DbTimeStamp,
    Chapter,
    PropVariant,
    VarNumeric,
    VarChar,
    LongVarChar,
    VarWChar,
    LongVarWChar,
    VarBinary,
    LongVarBinary,
}

/// Every native type with its catalog code.
const CODES: &[(NativeType, i32)] = &[
    (NativeType::Empty, 0),
    (NativeType::SmallInt, 2),
    (NativeType::Integer, 3),
    (NativeType::Single, 4),
    (NativeType::Double, 5),
    (NativeType::Currency, 6),
    (NativeType::Date, 7),
    (NativeType::BStr, 8),
    (NativeType::IDispatch, 9),
    (NativeType::Error, 10),
    (NativeType::Boolean, 11),
    (NativeType::Variant, 12),
    (NativeType::IUnknown, 13),
    (NativeType::Decimal, 14),
    (NativeType::TinyInt, 16),
    (NativeType::UnsignedTinyInt, 17),
    (NativeType::UnsignedSmallInt, 18),
    (NativeType::UnsignedInt, 19),
    (NativeType::BigInt, 20),
    (NativeType::UnsignedBigInt, 21),
    (NativeType::Filetime, 64),
    (NativeType::Guid, 72),
    (NativeType::Binary, 128),
    (NativeType::Char, 129),
    (NativeType::WChar, 130),
    (NativeType::Numeric, 131),
    (NativeType::DbDate, 133),
    (NativeType::DbTime, 134),
    (NativeType::DbTimeStamp, 135),
    (NativeType::Chapter, 136),
    (NativeType::PropVariant, 138),
    (NativeType::VarNumeric, 139),
    (NativeType::VarChar, 200),
    (NativeType::LongVarChar, 201),
    (NativeType::VarWChar, 202),
    (NativeType::LongVarWChar, 203),
    (NativeType::VarBinary, 204),
    (NativeType::LongVarBinary, 205),
];

impl NativeType {
    /// All native types, in code order.
    pub fn all() -> impl Iterator<Item = NativeType> {
        CODES.iter().map(|(t, _)| *t)
    }

    /// Look up a native type by its catalog code.
    pub fn from_code(code: i32) -> Option<NativeType> {
        CODES.iter().find(|(_, c)| *c == code).map(|(t, _)| *t)
    }

    /// The catalog code of this type.
    pub fn code(self) -> i32 {
        CODES
            .iter()
            .find(|(t, _)| *t == self)
            .map(|(_, c)| *c)
            .unwrap_or_default()
    }

    /// Whether values of this type carry a numeric precision/scale rather
    /// than a character length.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            NativeType::Decimal
                | NativeType::Double
                | NativeType::Integer
                | NativeType::Numeric
                | NativeType::Single
                | NativeType::SmallInt
                | NativeType::TinyInt
                | NativeType::UnsignedBigInt
                | NativeType::UnsignedInt
                | NativeType::UnsignedSmallInt
                | NativeType::UnsignedTinyInt
                | NativeType::VarNumeric
                | NativeType::BigInt
                | NativeType::Currency
        )
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
