//! Identifier quoting, default-literal escaping and bound-parameter naming.
//!
//! SQL identifiers cannot be bound as parameters, so every table and column
//! name that reaches generated SQL goes through one of the quoting functions
//! here. Values never do: they are bound through parameters whose names come
//! from [`parameter_name`].
//!
//! Generated SQLite DDL quotes identifiers and text defaults the same way,
//! wrapping them in single quotes and doubling embedded quotes. SQLite accepts
//! a single-quoted string wherever an identifier is expected.

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted from a source catalog.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier read from a source catalog.
///
/// Rejects empty identifiers, identifiers containing NUL and identifiers
/// longer than [`MAX_IDENTIFIER_LENGTH`] characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let len = name.chars().count();
    if len > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, len, name
        )));
    }

    Ok(())
}

/// Escape a name or text literal for generated SQLite SQL.
///
/// Wraps in single quotes and doubles every embedded single quote.
///
/// ```
/// use mdb_sqlite_migrate::core::identifier::escape;
/// assert_eq!(escape("users"), "'users'");
/// assert_eq!(escape("O'Brien"), "'O''Brien'");
/// ```
pub fn escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Validate and quote a SQLite identifier.
pub fn quote_sqlite(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(escape(name))
}

/// Validate and double-quote a SQLite identifier for expression contexts
/// (select lists, WHERE), where a single-quoted name would be a string.
pub fn quote_sqlite_expr(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote an Access (Jet SQL) identifier using brackets.
///
/// Jet has no escape for `]` inside a bracketed name, so such names are
/// rejected.
pub fn quote_access(name: &str) -> Result<String> {
    validate_identifier(name)?;
    if name.contains(']') {
        return Err(MigrateError::Config(format!(
            "Identifier contains ']' which cannot be quoted for Access: {:?}",
            name
        )));
    }
    Ok(format!("[{}]", name))
}

/// Encode a column name as a bound-parameter token.
///
/// Each UTF-16 code unit becomes four lowercase hex digits; the units are
/// emitted last to first. Fixed width makes the mapping injective, so two
/// distinct names never share a token.
pub fn mangle(name: &str) -> String {
    let units: Vec<u16> = name.encode_utf16().collect();
    units.iter().rev().map(|unit| format!("{:04x}", unit)).collect()
}

/// Named parameter (`@` + mangled name) for a column.
///
/// Statement preparation and value binding both call this, so they always
/// agree on the name.
pub fn parameter_name(column: &str) -> String {
    format!("@{}", mangle(column))
}

/// Validate a raw (unquoted) default expression before it is spliced into DDL.
///
/// Raw defaults come from the source catalog for numeric and boolean
/// columns and should be simple expressions such as `0`, `-1.5` or `True`.
/// Statement separators and comments are rejected.
pub fn validate_default_expression(expr: &str) -> Result<()> {
    const FORBIDDEN: &[&str] = &[";", "--", "/*", "*/"];

    for pattern in FORBIDDEN {
        if expr.contains(pattern) {
            return Err(MigrateError::Config(format!(
                "SECURITY: Default expression contains forbidden pattern '{}': {}",
                pattern, expr
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_clean_name() {
        assert_eq!(escape("Customers"), "'Customers'");
        assert_eq!(escape(""), "''");
    }

    #[test]
    fn test_escape_doubles_quotes() {
        assert_eq!(escape("O'Brien"), "'O''Brien'");
        assert_eq!(escape("''"), "''''''");
    }

    #[test]
    fn test_escape_injection_safely_quoted() {
        let quoted = escape("x'); DROP TABLE users; --");
        assert_eq!(quoted, "'x''); DROP TABLE users; --'");
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        assert!(validate_identifier("").is_err());
        assert!(quote_sqlite("").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let err = validate_identifier("users\0--").unwrap_err();
        assert!(err.to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length_counts_chars() {
        assert!(validate_identifier(&"é".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_quote_sqlite_expr() {
        assert_eq!(quote_sqlite_expr("name").unwrap(), "\"name\"");
        assert_eq!(quote_sqlite_expr("a\"b").unwrap(), "\"a\"\"b\"");
    }

    #[test]
    fn test_quote_access() {
        assert_eq!(quote_access("Order Details").unwrap(), "[Order Details]");
        assert!(quote_access("bad]name").is_err());
    }

    #[test]
    fn test_mangle_reverses_code_units() {
        assert_eq!(mangle("ab"), "00620061");
        assert_eq!(mangle("A"), "0041");
        assert_eq!(parameter_name("id"), "@00640069");
        // surrogate pairs are reversed unit by unit
        assert_eq!(mangle("\u{1F600}"), "de00d83d");
    }

    #[test]
    fn test_mangle_is_deterministic() {
        assert_eq!(mangle("Customer Name"), mangle("Customer Name"));
    }

    #[test]
    fn test_mangle_distinct_names_do_not_collide() {
        let names = ["ab", "ba", "a", "aa", "a b", "Größe", "名前", "id", "ID"];
        let mut tokens: Vec<String> = names.iter().map(|n| mangle(n)).collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), names.len());
    }

    #[test]
    fn test_mangle_is_sqlite_safe() {
        assert!(mangle("x'; --").chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_default_expression() {
        assert!(validate_default_expression("0").is_ok());
        assert!(validate_default_expression("Now()").is_ok());
        assert!(validate_default_expression("1; DROP TABLE x").is_err());
        assert!(validate_default_expression("1 -- x").is_err());
    }
}
