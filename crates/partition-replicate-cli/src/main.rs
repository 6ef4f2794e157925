//! partition-replicate CLI - hash-partitioned parallel table replication.

use clap::{Args, Parser, Subcommand};
use partition_replicate::{
    Config, ConfigOverrides, ConnectionRole, ReplicateError, Replicator, RunStatus,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code when some or all partitions failed.
const EXIT_INCOMPLETE: u8 = 4;

/// Exit code when the run was interrupted.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "partition-replicate")]
#[command(about = "Hash-partitioned parallel table replication")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replicate the source into the sink
    Run {
        /// Dry run: print the statements each partition would run without connecting
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Test database connections
    HealthCheck,
}

/// Values taking precedence over the configuration file.
#[derive(Args, Default)]
struct OverrideArgs {
    /// Override source table
    #[arg(long)]
    source_table: Option<String>,

    /// Override source column list (comma-separated)
    #[arg(long)]
    source_columns: Option<String>,

    /// Override source query (replaces the table scan)
    #[arg(long)]
    source_query: Option<String>,

    /// Override source filter condition
    #[arg(long)]
    source_where: Option<String>,

    /// Override number of partitions
    #[arg(long)]
    jobs: Option<u32>,

    /// Override sink table
    #[arg(long)]
    sink_table: Option<String>,

    /// Override sink column list (comma-separated)
    #[arg(long)]
    sink_columns: Option<String>,

    /// Override rows per INSERT batch
    #[arg(long)]
    batch_size: Option<usize>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        ConfigOverrides {
            source_table: args.source_table,
            source_columns: args.source_columns,
            source_query: args.source_query,
            source_where: args.source_where,
            sink_table: args.sink_table,
            sink_columns: args.sink_columns,
            jobs: args.jobs,
            batch_size: args.batch_size,
        }
    }
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

async fn run() -> Result<ExitCode, ReplicateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load_unvalidated(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { dry_run, overrides } => {
            let config = config.with_overrides(&overrides.into())?;
            let replicator = Replicator::new(config)?;

            if dry_run {
                print_plan(&replicator, cli.output_json)?;
                return Ok(ExitCode::SUCCESS);
            }

            let cancel_token = setup_signal_handler()?;
            let report = replicator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nReplication {}!", report.status);
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Partitions: {}/{}",
                    report.jobs as usize - report.failed_partitions().count(),
                    report.jobs
                );
                println!("  Rows: {}", report.rows_written);
                println!("  Throughput: {} rows/sec", report.rows_per_second);
                for failed in report.failed_partitions() {
                    println!(
                        "  Partition {} {}: {}",
                        failed.index,
                        failed.status,
                        failed.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }

            Ok(match report.status {
                RunStatus::Completed => ExitCode::SUCCESS,
                RunStatus::Cancelled => ExitCode::from(EXIT_CANCELLED),
                RunStatus::Partial | RunStatus::Failed => ExitCode::from(EXIT_INCOMPLETE),
            })
        }

        Commands::HealthCheck => {
            config.validate()?;
            let replicator = Replicator::new(config)?;
            let result = replicator.health_check().await?;
            let source_type = &replicator.config().source.connection.r#type;
            let sink_type = &replicator.config().sink.connection.r#type;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    source_type,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Sink ({}): {} ({}ms)",
                    sink_type,
                    if result.sink_connected { "OK" } else { "FAILED" },
                    result.sink_latency_ms
                );
                if let Some(ref err) = result.sink_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(ReplicateError::connection(
                    if result.source_connected {
                        ConnectionRole::Sink
                    } else {
                        ConnectionRole::Source
                    },
                    "health check failed",
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_plan(replicator: &Replicator, output_json: bool) -> Result<(), ReplicateError> {
    let plan = replicator.plan()?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Dry run: {} partitions, batch size {}", plan.jobs, plan.batch_size);
    for (index, sql) in &plan.reads {
        println!("  Partition {} (bound index {}):", index, index);
        println!("    {}", sql);
    }
    match &plan.insert {
        Some(sql) => println!("  Insert: {}", sql),
        None => println!("  Insert: width taken from the first source row"),
    }
    Ok(())
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
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, ReplicateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Rolling back open partitions...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, ReplicateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Rolling back open partitions...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
