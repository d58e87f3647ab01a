//! Elefante MCP Server - a local second brain for AI agents
//!
//! Hybrid vector + graph memory engine exposed over line-delimited JSON-RPC
//! on stdio:
//!
//! - Ingestion pipeline with deterministic classification, near-duplicate
//!   reinforcement, and automatic user/session/entity linking
//! - Hybrid retrieval: parallel semantic + graph + conversation collectors
//!   with adaptive weighting and result merging
//! - Deterministic refinery enforcing one active memory per canonical key
//! - Agent-driven ETL loop for topology classification
//! - Transaction-scoped cross-process write locking with stale-lock recovery

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use elefante_core::{EngineConfig, MemoryOrchestrator};
use elefante_mcp::{McpServer, StdioTransport};

/// Parse command-line arguments; returns an optional data-dir override.
/// Exits the process for `--help` / `--version`.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut data_dir: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Elefante MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Hybrid vector + graph second-brain memory over the Model Context Protocol.");
                println!();
                println!("USAGE:");
                println!("    elefante-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --data-dir <PATH>       Custom data directory (default ~/.elefante)");
                println!();
                println!("ENVIRONMENT:");
                println!("    ELEFANTE_DATA_DIR              Data directory override");
                println!("    ELEFANTE_LOG_LEVEL             Log level filter (debug, info, warn, error)");
                println!("    ELEFANTE_CONFIG_PATH           Optional JSON config file");
                println!("    ELEFANTE_ALLOW_TEST_MEMORIES   Allow test-namespace memories (1/true/yes/on)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("elefante-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--data-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --data-dir requires a path argument");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--data-dir=") => {
                let path = arg.strip_prefix("--data-dir=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --data-dir requires a path argument");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'elefante-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    data_dir
}

/// Logging goes to stderr (stdout is reserved for JSON-RPC) plus a rotating
/// JSON file under the data directory. The returned guard must stay alive.
fn init_logging(config: &EngineConfig) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(config.logs_dir())?;
    let file_appender = tracing_appender::rolling::daily(config.logs_dir(), "elefante.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = parse_args();

    let mut config = EngineConfig::from_env().context("resolving configuration")?;
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    config.ensure_layout().context("creating data directory layout")?;

    let _log_guard = init_logging(&config).context("initializing logging")?;
    info!("Elefante MCP Server v{} starting", env!("CARGO_PKG_VERSION"));
    info!(data_dir = %config.data_dir.display(), "data directory resolved");

    let orchestrator = match MemoryOrchestrator::open(config) {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            error!("Failed to initialize stores: {}", e);
            std::process::exit(1);
        }
    };

    let server = McpServer::new(orchestrator);
    let transport = StdioTransport::new();

    info!("Starting MCP server on stdio");
    if let Err(e) = transport.run(server).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Elefante MCP Server shutting down");
    Ok(())
}
