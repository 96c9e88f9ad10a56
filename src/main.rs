//! SparkKV server entry point.
//!
//! Parses flags, sets up logging, builds the worker pool and runs the accept
//! loop until Ctrl+C.

use anyhow::Context;
use sparkkv::connection::ConnectionStats;
use sparkkv::protocol::parser::DEFAULT_MAX_BULK_LEN;
use sparkkv::storage::Store;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Debug)]
struct Config {
    host: String,
    port: u16,
    /// Runtime worker threads
    workers: usize,
    /// Largest accepted bulk argument
    max_bulk_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            host: sparkkv::DEFAULT_HOST.to_string(),
            port: sparkkv::DEFAULT_PORT,
            workers: cpus.max(sparkkv::MIN_WORKERS),
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = flag_value(&args, i).to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = parse_flag(&args, i, "port number");
                    i += 2;
                }
                "--workers" | "-w" => {
                    let workers: usize = parse_flag(&args, i, "worker count");
                    config.workers = workers.max(sparkkv::MIN_WORKERS);
                    i += 2;
                }
                "--max-bulk-len" => {
                    config.max_bulk_len = parse_flag(&args, i, "byte count");
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("SparkKV version {}", sparkkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn flag_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value.as_str(),
        None => {
            eprintln!("Error: {} requires a value", args[i]);
            std::process::exit(1);
        }
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], i: usize, what: &str) -> T {
    flag_value(args, i).parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid {}", what);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
SparkKV - A Small In-Memory Key-Value Server

USAGE:
    sparkkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>          Port to listen on (default: 6379)
    -w, --workers <N>          Worker threads (default: CPU count, at least 4)
        --max-bulk-len <BYTES> Largest accepted argument (default: 65536)
    -v, --version              Print version information
        --help                 Print this help message

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=sparkkv=debug

CONNECTING:
    $ redis-cli -p 6379
    127.0.0.1:6379> SET name "Ariz" PX 5000
    OK
    127.0.0.1:6379> GET name
    "Ariz"
"#
    );
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let storage = Arc::new(Store::new());
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(
        address = %config.bind_address(),
        workers = config.workers,
        max_bulk_len = config.max_bulk_len,
        "SparkKV v{} listening",
        sparkkv::VERSION
    );

    tokio::select! {
        _ = sparkkv::server::run(listener, Arc::clone(&storage), Arc::clone(&stats), config.max_bulk_len) => {}
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    let store_stats = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        keys = store_stats.keys,
        expired = store_stats.expired_count,
        "Server shutdown complete"
    );
    Ok(())
}
