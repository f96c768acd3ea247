//! mdb-sqlite-migrate CLI - migrate MS Access databases into SQLite.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use mdb_sqlite_migrate::error::{
    EXIT_CANCELLED, EXIT_COPY_ERROR, EXIT_DEPENDENCY_ERROR, EXIT_SOURCE_ERROR,
};
use mdb_sqlite_migrate::source::open_source;
use mdb_sqlite_migrate::{
    Config, MigrateError, MigrationPlan, MigrationResult, Orchestrator, SourceKind, SqliteWriter,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mdb-sqlite-migrate")]
#[command(about = "Migrate MS Access databases into SQLite, schema and data")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (flags override its values)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct SourceArgs {
    /// Source database file (.mdb, .accdb or SQLite)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Source type: access or sqlite [default: from the file extension]
    #[arg(long)]
    source_type: Option<SourceKind>,

    /// Target SQLite file [default: source path with a .db extension]
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Only read tables from this source schema
    #[arg(long)]
    schema: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the target tables and copy every row
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Delete an existing target file first
        #[arg(short, long)]
        erase: bool,

        /// Log the schema dump, creation order and DDL at info level
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the source schema and table creation order without writing anything
    Inspect {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match &cli.command {
        Commands::Run {
            source,
            erase,
            verbose,
        } => {
            let mut config = build_config(cli.config.as_deref(), source)?;
            config.target.erase |= *erase;
            config.migration.verbose |= *verbose;
            config.validate()?;

            let cancel_token = setup_signal_handler();

            let mut orchestrator = Orchestrator::new(config)?;
            let progress_task = if cli.progress {
                let (tx, rx) = mpsc::unbounded_channel();
                orchestrator = orchestrator.with_progress(tx);
                Some(tokio::spawn(print_progress(rx)))
            } else {
                None
            };

            let result = orchestrator.run(cancel_token).await;
            // Drop the sender side so the printer drains and stops
            drop(orchestrator);
            if let Some(task) = progress_task {
                let _ = task.await;
            }
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_summary(&result);
            }

            Ok(exit_code_for(&result))
        }

        Commands::Inspect { source } => {
            let config = build_config(cli.config.as_deref(), source)?;
            config.validate()?;

            // Planning never writes, so the target is a throwaway
            let orchestrator = Orchestrator::with_backends(
                config.clone(),
                open_source(&config)?,
                Arc::new(SqliteWriter::open_in_memory()?),
            );
            let plan = orchestrator.plan().await?;

            if cli.output_json {
                println!("{}", plan_json(&plan)?);
            } else {
                print!("{}", plan);
            }

            Ok(inspect_exit_code(&plan))
        }
    }
}

/// Excluded tables take precedence over tables that could not be read.
fn inspect_exit_code(plan: &MigrationPlan) -> ExitCode {
    if !plan.excluded.is_empty() {
        ExitCode::from(EXIT_DEPENDENCY_ERROR)
    } else if !plan.introspection_failures.is_empty() {
        ExitCode::from(EXIT_SOURCE_ERROR)
    } else {
        ExitCode::SUCCESS
    }
}

/// Merge the config file (if any) with command-line flags.
fn build_config(path: Option<&Path>, args: &SourceArgs) -> Result<Config, MigrateError> {
    let mut config = match (path, &args.source) {
        (Some(path), _) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        (None, Some(source)) => Config::for_paths(
            args.source_type.unwrap_or_else(|| kind_from_extension(source)),
            source.clone(),
            None,
        ),
        (None, None) => {
            return Err(MigrateError::Config(
                "either --config or --source is required".into(),
            ))
        }
    };

    if let Some(source) = &args.source {
        config.source.path = source.clone();
        if args.source_type.is_none() {
            config.source.r#type = kind_from_extension(source);
        }
    }
    if let Some(kind) = args.source_type {
        config.source.r#type = kind;
    }
    if let Some(target) = &args.target {
        config.target.path = Some(target.clone());
    }
    if let Some(schema) = &args.schema {
        config.source.schema = Some(schema.clone());
    }

    Ok(config)
}

fn kind_from_extension(path: &Path) -> SourceKind {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| e.to_lowercase().parse().ok())
        .unwrap_or_default()
}

fn exit_code_for(result: &MigrationResult) -> ExitCode {
    match result.status.as_str() {
        "completed" => ExitCode::SUCCESS,
        "cancelled" => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::from(EXIT_COPY_ERROR),
    }
}

fn print_summary(result: &MigrationResult) {
    let status_msg = match result.status.as_str() {
        "completed" => "Migration completed!",
        "cancelled" => "Migration cancelled.",
        _ => "Migration completed with errors.",
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!("  Tables: {}/{}", result.tables_success, result.tables_total);
    println!("  Rows: {}", result.rows_transferred);
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    println!("  Creation order: {}", result.emission_order.join(", "));
    for table in result.tables.iter() {
        match &table.error {
            Some(err) => println!("  {:?} {} ({}): {}", table.status, table.table, table.stage, err),
            None => println!("  {:?} {} ({} rows)", table.status, table.table, table.rows),
        }
    }
}

fn plan_json(plan: &MigrationPlan) -> Result<String, MigrateError> {
    let failures: Vec<_> = plan
        .introspection_failures
        .iter()
        .map(|(table, err)| serde_json::json!({ "table": table, "error": err.to_string() }))
        .collect();
    let value = serde_json::json!({
        "emission_order": plan.emission_order(),
        "excluded_tables": plan.excluded,
        "introspection_failures": failures,
        "schema": plan.schema,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<mdb_sqlite_migrate::ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!("Cannot serialize progress event: {}", e),
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Cannot install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Rolling back the current table and stopping...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Rolling back the current table and stopping...");
        token.cancel();
    });

    cancel_token
}
