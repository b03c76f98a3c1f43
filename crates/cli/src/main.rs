mod config;
mod error;
mod tools;

use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use calling::CallCorrelator;
use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};
use tools::CallTools;

const CONFIG_FILE: &str = "callmcp.toml";

#[derive(Parser)]
#[command(name = "callmcp")]
#[command(about = "MCP tools for finding phone numbers and calling them", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the MCP tools on stdio, with the call webhook alongside
    Serve,
    /// Look up phone numbers once and print them as JSON
    Lookup {
        /// What to search for
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Run only the call webhook server, to check the provider can reach it.
    /// No batches are dispatched, so every callback is logged as unmatched.
    Webhook,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr; stdout belongs to the MCP session.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Serve) | None => cmd_serve(config).await,
        Some(Commands::Lookup { query }) => cmd_lookup(&config, &query.join(" ")).await,
        Some(Commands::Webhook) => cmd_webhook(config).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::resolve(path)?;
    if path.exists() {
        info!(path = %path.display(), "loaded config");
    }
    for key in config.missing_credentials() {
        warn!(key, "credential not configured; the tool using it will fail");
    }
    Ok(config)
}

async fn cmd_serve(config: Config) -> Result<()> {
    let correlator = Arc::new(CallCorrelator::new());

    let listener = TcpListener::bind(config.webhook.bind).await?;
    info!(addr = %config.webhook.bind, "call webhook listening");
    let webhook = axum::serve(listener, config.callback_receiver(Arc::clone(&correlator)).router());

    let tools = CallTools::new(config.phone_lookup(), config.dispatcher(correlator));
    let session = tools
        .serve(stdio())
        .await
        .map_err(|e| Error::Mcp(e.to_string()))?;

    // The session ends when the host closes stdin.
    tokio::select! {
        quit = session.waiting() => {
            quit.map_err(|e| Error::Mcp(e.to_string()))?;
        }
        served = webhook.into_future() => served?,
    }

    info!("session closed");
    Ok(())
}

async fn cmd_lookup(config: &Config, query: &str) -> Result<()> {
    let result = config.phone_lookup().find(query).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_webhook(config: Config) -> Result<()> {
    let correlator = Arc::new(CallCorrelator::new());
    let listener = TcpListener::bind(config.webhook.bind).await?;
    info!(addr = %config.webhook.bind, "call webhook listening");

    axum::serve(listener, config.callback_receiver(correlator).router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
