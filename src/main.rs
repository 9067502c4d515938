//! logtail - serve the last lines of files under a root directory over HTTP
//!
//! ## Usage
//!
//! ### Serve mode (default)
//! ```bash
//! logtail serve /var/log --port 8080
//! # then:
//! curl 'http://127.0.0.1:8080/syslog?n=50&grep=error'
//! ```
//!
//! ### Generator mode
//! ```bash
//! logtail generate demo.log --lines 1000
//! ```
//!
//! Responses stream the requested lines newest-first as `text/plain`,
//! without ever buffering the file or the response in memory.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use logtail::http_server::TailServer;
use logtail::log_generator;
use logtail::server_config::ServerConfig;
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "logtail")]
#[command(about = "Serve the last lines of log files over HTTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable trace logs
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP tail server (default)
    Serve(ServeArgs),
    /// Generate a numbered-line log file for testing
    Generate {
        /// Path of the file to generate
        path: PathBuf,
        /// The amount of log lines to generate
        #[arg(short = 'n', long, default_value_t = 10)]
        lines: u64,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Root directory to serve files from
    root: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network address to listen at (overrides config)
    #[arg(long)]
    listen_addr: Option<IpAddr>,

    /// Network port to listen at (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.trace {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Some(Commands::Generate { path, lines }) => log_generator::generate(&path, lines),
        Some(Commands::Serve(args)) => run_server(args),
        None => run_server(ServeArgs::default()),
    }
}

fn run_server(args: ServeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::from_env(),
    };
    if let Some(root) = args.root {
        config.root_dir = root;
    }
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    // Resolve the root once at startup; request paths are joined onto it.
    config.root_dir = std::fs::canonicalize(&config.root_dir).with_context(|| {
        format!(
            "Failed to resolve root directory {}",
            config.root_dir.display()
        )
    })?;
    tracing::info!("Serving files under {}", config.root_dir.display());

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let server = TailServer::bind(config).await?;
            server.serve(shutdown_signal()?).await
        })
}

/// Resolves when the process receives SIGINT or SIGTERM.
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        tracing::info!("Got signal, shutting down");
    })
}
