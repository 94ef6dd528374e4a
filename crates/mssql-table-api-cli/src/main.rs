//! mssql-table-api CLI - generic HTTP data API over MSSQL tables.

use clap::{Parser, Subcommand};
use mssql_table_api::{http, ApiError, Config, Database, MssqlPool, TableService};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-table-api")]
#[command(about = "Generic HTTP data API over Microsoft SQL Server tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (environment variables are used when it does not exist)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Timeout in seconds for graceful shutdown (default: 30)
    #[arg(long, default_value = "30")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the bind host
        #[arg(long)]
        bind: Option<String>,

        /// Override the bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Test the database connection
    HealthCheck,

    /// List tables exposed by the API
    Tables,

    /// Show the discovered schema of a table
    Describe {
        /// Table name
        table: String,
    },
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

async fn run() -> Result<(), ApiError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load_or_env(&cli.config)?.with_auto_tuning();
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Serve { bind, port } => {
            if let Some(host) = bind {
                config.server.host = host;
            }
            if let Some(p) = port {
                config.server.port = p;
            }

            let pool = Arc::new(MssqlPool::new(&config.database).await?);
            let service = Arc::new(TableService::new(
                pool,
                config.database.schema.clone(),
                (&config.server).into(),
            ));

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler(cli.shutdown_timeout)?;

            let addr = config.server.socket_addr();
            let server = http::serve(service, &addr, cancel_token.clone());
            tokio::pin!(server);

            tokio::select! {
                result = &mut server => result?,
                _ = cancel_token.cancelled() => {
                    let timeout = Duration::from_secs(cli.shutdown_timeout);
                    match tokio::time::timeout(timeout, &mut server).await {
                        Ok(result) => result?,
                        Err(_) => warn!(
                            "Graceful shutdown timed out after {}s, dropping open connections",
                            cli.shutdown_timeout
                        ),
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            let outcome = match MssqlPool::with_max_connections(&config.database, 1).await {
                Ok(pool) => pool.ping().await,
                Err(e) => Err(e),
            };
            let latency_ms = start.elapsed().as_millis() as u64;

            if cli.output_json {
                let report = serde_json::json!({
                    "connected": outcome.is_ok(),
                    "latency_ms": latency_ms,
                    "error": outcome.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Database (MSSQL {}:{}/{}): {} ({}ms)",
                    config.database.host,
                    config.database.port,
                    config.database.database,
                    if outcome.is_ok() { "OK" } else { "FAILED" },
                    latency_ms
                );
                if let Err(ref err) = outcome {
                    println!("    Error: {}", err);
                }
            }

            outcome?;
        }

        Commands::Tables => {
            let service = connect(&config).await?;
            let tables = service.list_tables().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                println!("Tables in schema {}:", config.database.schema);
                for table in &tables {
                    println!("  {}", table);
                }
                println!("\n  Total: {}", tables.len());
            }
        }

        Commands::Describe { table } => {
            let service = connect(&config).await?;
            let schema = service.describe(&table).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(schema.as_ref())?);
            } else {
                println!("Table {}:", schema.full_name());
                for col in &schema.columns {
                    let mut notes = Vec::new();
                    if col.is_primary_key {
                        notes.push("PK".to_string());
                    }
                    if let Some(ref fk) = col.foreign_key {
                        notes.push(format!("FK {}", fk));
                    }
                    if col.filterable {
                        notes.push("filterable".to_string());
                    }
                    println!(
                        "  {:<30} {:<16} {:<8} {}",
                        col.name,
                        col.native_type,
                        col.semantic_type,
                        notes.join(", ")
                    );
                }
                if !schema.has_pk() {
                    println!("\n  (no primary key: update, upsert and delete are unavailable)");
                }
            }
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<TableService, ApiError> {
    let pool = MssqlPool::with_max_connections(&config.database, 2).await?;
    Ok(TableService::new(
        Arc::new(pool),
        config.database.schema.clone(),
        (&config.server).into(),
    ))
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    // RUST_LOG wins over --verbosity when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
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
/// Handles both SIGINT (Ctrl-C) and SIGTERM (container shutdown).
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, ApiError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!(
            "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
            name, shutdown_timeout
        );
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(_shutdown_timeout: u64) -> Result<CancellationToken, ApiError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
