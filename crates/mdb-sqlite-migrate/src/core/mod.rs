//! Engine-neutral building blocks of a migration.
//!
//! - [`schema`]: Schema, table and column metadata
//! - [`native`]: The closed set of native source column types
//! - [`value`]: Owned SQL values and rows
//! - [`identifier`]: Identifier quoting and bound-parameter naming
//! - [`ordering`]: Foreign-key aware table ordering
//! - [`traits`]: Source and target backend capabilities
//!
//! Backends in `source` and `target` implement the traits; the orchestrator
//! only talks to them through the traits, so tests can drive it with
//! in-memory implementations.

pub mod identifier;
pub mod native;
pub mod ordering;
pub mod schema;
pub mod traits;
pub mod value;

pub use native::NativeType;
pub use ordering::{sort_by_dependencies, DependencyOrder};
pub use schema::{Column, ColumnReference, Schema, Table};
pub use traits::{
    CopyOptions, ProgressEvent, RowConsumer, RowProducer, RowStream, SchemaReader, SchemaReport,
    SchemaWriter, SourceBackend, TargetBackend,
};
pub use value::{Row, SqlValue};
