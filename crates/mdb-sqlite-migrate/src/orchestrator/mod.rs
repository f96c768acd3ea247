//! Migration orchestrator - main workflow coordinator.
//!
//! A run moves linearly through [`Phase`]s:
//! `Init → IntrospectSchema → IntrospectColumns → SortByDependency →
//! CloneSchema → CopyData → Done`. Only a failure to list the source tables
//! or a connection-level error while creating tables stops the run; every
//! other failure is recorded against its table and the run moves on.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::schema::Schema;
use crate::core::traits::{CopyOptions, ProgressEvent, SourceBackend, TargetBackend};
use crate::error::{MigrateError, Result};
use crate::source::open_source;
use crate::target::SqliteWriter;

/// Stage of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    IntrospectSchema,
    IntrospectColumns,
    SortByDependency,
    CloneSchema,
    CopyData,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::IntrospectSchema => "introspect_schema",
            Phase::IntrospectColumns => "introspect_columns",
            Phase::SortByDependency => "sort_by_dependency",
            Phase::CloneSchema => "clone_schema",
            Phase::CopyData => "copy_data",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Schema introspected and ordered, ready to be created.
#[derive(Debug)]
pub struct MigrationPlan {
    /// Tables in creation order.
    pub schema: Schema,

    /// Tables left out of the creation order.
    pub excluded: Vec<String>,

    /// Tables whose definition could not be read.
    pub introspection_failures: Vec<(String, MigrateError)>,
}

impl MigrationPlan {
    /// Table names in creation order.
    pub fn emission_order(&self) -> Vec<String> {
        self.schema.table_names()
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.schema)?;
        writeln!(f, "Creation order:")?;
        for (i, name) in self.schema.table_names().iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, name)?;
        }
        if !self.excluded.is_empty() {
            writeln!(f, "Excluded (unresolved references): {}", self.excluded.join(", "))?;
        }
        for (table, err) in &self.introspection_failures {
            writeln!(f, "Unreadable: {} ({})", table, err)?;
        }
        Ok(())
    }
}

/// Final state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Created and every row committed.
    Copied,
    /// Failed at `stage`.
    Failed,
    /// Never attempted (excluded or cancelled).
    Skipped,
}

/// Outcome of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: String,
    pub status: TableStatus,
    /// Last phase the table reached.
    pub stage: Phase,
    /// Rows committed.
    pub rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableOutcome {
    fn copied(table: &str, rows: u64) -> Self {
        Self {
            table: table.to_string(),
            status: TableStatus::Copied,
            stage: Phase::Done,
            rows,
            error: None,
        }
    }

    fn failed(table: &str, stage: Phase, error: &MigrateError) -> Self {
        Self {
            table: table.to_string(),
            status: TableStatus::Failed,
            stage,
            rows: 0,
            error: Some(error.to_string()),
        }
    }

    fn skipped(table: &str, stage: Phase, reason: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            status: TableStatus::Skipped,
            stage,
            rows: 0,
            error: Some(reason.into()),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: `completed`, `completed_with_errors` or `cancelled`.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Tables found in the source.
    pub tables_total: usize,

    /// Tables fully copied.
    pub tables_success: usize,

    /// Tables that failed or were skipped.
    pub tables_failed: usize,

    /// Total rows committed.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// Creation order of the tables.
    pub emission_order: Vec<String>,

    /// Tables left out of the creation order.
    pub excluded_tables: Vec<String>,

    /// Per-table outcomes, in the order they were decided.
    pub tables: Vec<TableOutcome>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Names of tables that did not copy.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.status != TableStatus::Copied)
            .map(|t| t.table.as_str())
            .collect()
    }

    /// Outcome of one table.
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceBackend>,
    target: Arc<dyn TargetBackend>,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl Orchestrator {
    /// Create an orchestrator with the backends the configuration selects.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let source = open_source(&config)?;
        let target = SqliteWriter::open(&config.target_path(), &config.target)?
            .with_verbose(config.migration.verbose);

        Ok(Self::with_backends(config, source, Arc::new(target)))
    }

    /// Create an orchestrator over explicit backends.
    pub fn with_backends(
        config: Config,
        source: Arc<dyn SourceBackend>,
        target: Arc<dyn TargetBackend>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            progress: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_progress(mut self, tx: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Introspect the source and order its tables, without touching the
    /// target.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let schema_filter = self.config.source.schema.as_deref();

        debug!("Phase: {}", Phase::IntrospectSchema);
        let tables = self.source.list_tables(schema_filter).await?;
        if tables.is_empty() {
            warn!("Source {} has no tables", self.source.db_type());
        }
        info!("Found {} tables in {} source", tables.len(), self.source.db_type());

        debug!("Phase: {}", Phase::IntrospectColumns);
        let mut schema = Schema::new(self.config.source.schema.clone());
        let mut introspection_failures = Vec::new();
        for mut table in tables {
            match self.source.populate_table_definition(&mut table).await {
                Ok(()) => schema.add_table(table),
                Err(e) => {
                    error!("Cannot read definition of {}: {}", table.name, e);
                    introspection_failures.push((table.name, e));
                }
            }
        }

        debug!("Phase: {}", Phase::SortByDependency);
        let order = schema.sort_by_dependencies();
        if let Some(e) = order.cycle_error() {
            warn!("{}", e);
        }

        let plan = MigrationPlan {
            schema,
            excluded: order.excluded_names(),
            introspection_failures,
        };

        if self.config.migration.verbose {
            info!("Creation order: {}", plan.emission_order().join(", "));
            info!("\n{}", plan.schema);
        } else {
            debug!("Creation order: {}", plan.emission_order().join(", "));
        }

        Ok(plan)
    }

    /// Run the migration.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting migration run {}: {} -> {}",
            run_id,
            self.source.db_type(),
            self.target.db_type()
        );

        if cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        // Phases 1-3: introspect and order
        let plan = self.plan().await?;
        let mut outcomes: Vec<TableOutcome> = plan
            .introspection_failures
            .iter()
            .map(|(table, e)| TableOutcome::failed(table, Phase::IntrospectColumns, e))
            .collect();
        for name in &plan.excluded {
            outcomes.push(TableOutcome::skipped(
                name,
                Phase::SortByDependency,
                "part of a foreign key cycle or references a missing table",
            ));
        }

        // Phase 4: create tables
        info!("Phase: {} ({} tables)", Phase::CloneSchema, plan.schema.len());
        let report = self.target.clone_schema(&plan.schema).await?;
        for (table, e) in &report.failed {
            outcomes.push(TableOutcome::failed(table, Phase::CloneSchema, e));
        }

        // Phase 5: copy data, one table at a time
        info!("Phase: {} ({} tables)", Phase::CopyData, report.created.len());
        let opts = CopyOptions {
            cancel: cancel.clone(),
            progress: self.progress.clone(),
            progress_interval: self.config.migration.progress_interval,
        };
        let capacity = self.config.migration.channel_capacity;

        for table in &plan.schema.tables {
            if !report.is_created(&table.name) {
                continue;
            }
            if cancel.is_cancelled() {
                outcomes.push(TableOutcome::skipped(&table.name, Phase::CopyData, "cancelled"));
                continue;
            }

            opts.emit(ProgressEvent::TableStarted {
                table: table.name.clone(),
            });

            let rows = self.source.stream_rows(table, capacity);
            match self.target.copy_table(table, rows, &opts).await {
                Ok(count) => {
                    info!("{}: copied {} rows", table.name, count);
                    opts.emit(ProgressEvent::TableCompleted {
                        table: table.name.clone(),
                        rows: count,
                    });
                    outcomes.push(TableOutcome::copied(&table.name, count));
                }
                Err(e) => {
                    error!("{}: {}", table.name, e);
                    opts.emit(ProgressEvent::TableFailed {
                        table: table.name.clone(),
                        error: e.to_string(),
                    });
                    outcomes.push(TableOutcome::failed(&table.name, Phase::CopyData, &e));
                }
            }
        }

        // Phase 6: summarize
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let tables_success = outcomes
            .iter()
            .filter(|o| o.status == TableStatus::Copied)
            .count();
        let rows_transferred: u64 = outcomes.iter().map(|o| o.rows).sum();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as u64
        } else {
            0
        };

        let status = if cancel.is_cancelled() {
            "cancelled"
        } else if tables_success < outcomes.len() {
            "completed_with_errors"
        } else {
            "completed"
        };

        let result = MigrationResult {
            run_id,
            status: status.to_string(),
            duration_seconds: duration,
            started_at,
            completed_at,
            tables_total: outcomes.len(),
            tables_success,
            tables_failed: outcomes.len() - tables_success,
            rows_transferred,
            rows_per_second,
            emission_order: plan.emission_order(),
            excluded_tables: plan.excluded,
            tables: outcomes,
        };

        info!(
            "Migration {}: {}/{} tables, {} rows in {:.1}s ({} rows/s)",
            result.status,
            result.tables_success,
            result.tables_total,
            result.rows_transferred,
            result.duration_seconds,
            result.rows_per_second
        );
        for t in result.tables.iter().filter(|t| t.status != TableStatus::Copied) {
            warn!(
                "{}: {:?} at {}: {}",
                t.table,
                t.status,
                t.stage,
                t.error.as_deref().unwrap_or("")
            );
        }

        Ok(result)
    }
}
