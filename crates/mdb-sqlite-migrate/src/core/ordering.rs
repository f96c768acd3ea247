//! Foreign-key aware table ordering.
//!
//! Tables are placed by repeated passes: a table is placed once every table
//! its foreign keys reference is already placed. Passes stop when all tables
//! are placed or a pass places nothing. Tables still unplaced at that point
//! take part in a cycle or reference a table that does not exist; they are
//! returned separately so the caller can report them.

use std::collections::HashSet;

use tracing::debug;

use super::schema::{Schema, Table};
use crate::error::MigrateError;

/// Result of ordering a set of tables.
#[derive(Debug, Clone)]
pub struct DependencyOrder {
    /// Tables in emission order. Every referenced table precedes its referrers.
    pub ordered: Vec<Table>,

    /// Tables that could not be placed, in their original relative order.
    pub excluded: Vec<Table>,

    /// Number of passes made, including the final pass that placed nothing.
    pub passes: usize,
}

impl DependencyOrder {
    /// Whether every table was placed.
    pub fn is_complete(&self) -> bool {
        self.excluded.is_empty()
    }

    /// Names of the excluded tables.
    pub fn excluded_names(&self) -> Vec<String> {
        self.excluded.iter().map(|t| t.name.clone()).collect()
    }

    /// The error to report for excluded tables, if any.
    pub fn cycle_error(&self) -> Option<MigrateError> {
        if self.is_complete() {
            None
        } else {
            Some(MigrateError::DependencyCycle {
                tables: self.excluded_names(),
            })
        }
    }
}

/// Order tables so that referenced tables come first.
///
/// A table that only references itself is placeable immediately. Within a
/// pass a table placed earlier already counts as placed for the tables after
/// it, and placed tables keep their original relative order.
pub fn sort_by_dependencies(tables: Vec<Table>) -> DependencyOrder {
    let total = tables.len();
    let mut remaining = tables;
    let mut ordered: Vec<Table> = Vec::with_capacity(total);
    let mut placed: HashSet<String> = HashSet::with_capacity(total);
    let mut passes = 0;

    while !remaining.is_empty() {
        passes += 1;
        let before = ordered.len();
        let mut deferred = Vec::with_capacity(remaining.len());

        for table in remaining {
            let ready = table
                .referenced_tables()
                .iter()
                .all(|r| *r == table.name || placed.contains(*r));

            if ready {
                placed.insert(table.name.clone());
                ordered.push(table);
            } else {
                deferred.push(table);
            }
        }

        remaining = deferred;
        let added = ordered.len() - before;
        debug!(
            "Dependency pass {}: placed {} tables, {} remaining",
            passes,
            added,
            remaining.len()
        );

        if added == 0 {
            break;
        }
    }

    DependencyOrder {
        ordered,
        excluded: remaining,
        passes,
    }
}

impl Schema {
    /// Reorder the schema's tables by foreign-key dependency.
    ///
    /// Tables that cannot be placed are removed from the schema and returned.
    pub fn sort_by_dependencies(&mut self) -> DependencyOrder {
        let tables = std::mem::take(&mut self.tables);
        let order = sort_by_dependencies(tables);
        self.tables = order.ordered.clone();
        order
    }
}
