//! Huggsy: companion relay for the smart-toy voice pipeline
//!
//! Main binary with subcommands:
//! - `serve`: Run the relay (ingest, live stream, history, companion UI)
//! - `history`: Print the persisted transcript

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use huggsy_relay::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_SUBSCRIBER_BUFFER, HISTORY_FILE_NAME, HistoryStore, Relay,
    RelayConfig, create_router,
};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "huggsy")]
#[command(about = "Live event relay for the Huggsy companion UI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve {
        /// Address to bind
        #[arg(long, env = "HUGGSY_BIND", default_value = "0.0.0.0")]
        bind: String,

        /// HTTP port
        #[arg(long, env = "HUGGSY_PORT", default_value = "8080")]
        port: u16,

        /// Directory holding the persisted history
        #[arg(long, env = "HUGGSY_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,

        /// Number of records kept in history
        #[arg(long, env = "HUGGSY_HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
        history_limit: usize,

        /// Seconds between keepalive comments on live streams
        #[arg(long, env = "HUGGSY_KEEPALIVE_SECS", default_value = "30")]
        keepalive_secs: u64,

        /// Records buffered per subscriber before it is dropped as too slow
        #[arg(long, default_value_t = DEFAULT_SUBSCRIBER_BUFFER)]
        subscriber_buffer: usize,

        /// Companion UI directory (serves index.html at /)
        #[arg(long, env = "HUGGSY_STATIC_DIR")]
        static_dir: Option<String>,
    },

    /// Print the persisted transcript
    History {
        /// Directory holding the persisted history
        #[arg(long, env = "HUGGSY_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,

        /// Only print the last N records
        #[arg(long)]
        tail: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "huggsy=info,huggsy_relay=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            port,
            data_dir,
            history_limit,
            keepalive_secs,
            subscriber_buffer,
            static_dir,
        } => {
            let config = RelayConfig::default()
                .with_data_dir(data_dir)
                .with_history_limit(history_limit)
                .with_keepalive(Duration::from_secs(keepalive_secs.max(1)))
                .with_subscriber_buffer(subscriber_buffer);

            run_server(&config, &bind, port, static_dir.as_deref()).await
        }

        Commands::History { data_dir, tail } => {
            for line in transcript_lines(&data_dir, tail).await {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

async fn run_server(
    config: &RelayConfig,
    bind: &str,
    port: u16,
    static_dir: Option<&str>,
) -> Result<()> {
    let relay = Arc::new(Relay::open(config).await);
    let router = create_router(Arc::clone(&relay), static_dir);

    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| miette::miette!("failed to bind {}: {}", addr, e))?;

    tracing::info!("relay listening on http://{}", addr);
    tracing::info!("  ingest:   POST http://{}/api/chatbot", addr);
    tracing::info!("  stream:   GET  http://{}/api/events", addr);
    tracing::info!("  history:  GET  http://{}/api/messages", addr);

    let shutdown_relay = Arc::clone(&relay);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutting down, closing live streams");
            shutdown_relay.shutdown();
        })
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    tracing::info!("relay stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn transcript_lines(data_dir: &Path, tail: Option<usize>) -> Vec<String> {
    let records = HistoryStore::load(&data_dir.join(HISTORY_FILE_NAME)).await;
    let skip = tail.map_or(0, |n| records.len().saturating_sub(n));

    records
        .iter()
        .skip(skip)
        .map(|record| record.transcript_line())
        .collect()
}
