//! filedb-pg-load CLI - stream DBF and SQLite files into PostgreSQL.

use clap::Parser;
use filedb_pg_load::{Config, LoadError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "filedb-pg-load")]
#[command(about = "Bulk-load DBF and SQLite files into PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "load.yaml")]
    config: PathBuf,

    /// Write the text summary to this file as well
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Output the JSON report to stdout instead of the text summary
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Create schema only; skip the data copy
    #[arg(long)]
    schema_only: bool,

    /// Copy data only; skip schema creation and index builds
    #[arg(long)]
    data_only: bool,

    /// Truncate target tables instead of recreating them
    #[arg(long)]
    truncate: bool,

    /// Drop target tables before creating them
    #[arg(long)]
    include_drop: bool,

    /// Restrict the load to these tables (repeatable)
    #[arg(long = "only-table")]
    only_tables: Vec<String>,

    /// Exclude tables matching this regex (repeatable)
    #[arg(long = "exclude")]
    excluding: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), LoadError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| LoadError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // Apply command-line overrides.
    if cli.schema_only {
        config.load.schema_only = true;
    }
    if cli.data_only {
        config.load.data_only = true;
    }
    if cli.truncate {
        config.load.truncate = true;
        config.load.create_tables = false;
    }
    if cli.include_drop {
        config.load.include_drop = true;
    }
    if !cli.only_tables.is_empty() {
        config.load.only_tables = cli.only_tables.clone();
    }
    if !cli.excluding.is_empty() {
        config.load.excluding.extend(cli.excluding.iter().cloned());
    }
    if cli.summary.is_some() {
        config.load.summary_path = cli.summary.clone();
    }
    config.validate()?;

    let cancel = setup_signal_handler();
    let orchestrator = Orchestrator::new(config)?;
    let report = orchestrator.run(cancel).await?;

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.render());
    }

    if !report.failed_tables.is_empty() {
        return Err(LoadError::Config(format!(
            "{} of {} tables failed: {}",
            report.failed_tables.len(),
            report.tables.len(),
            report.failed_tables.join(", ")
        )));
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Cancel the returned token on SIGINT; workers stop at their next
/// suspension point and release their handles.
fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived interrupt, shutting down gracefully...");
            trigger.cancel();
        }
    });
    cancel
}
