//! mailscope: email address deliverability and domain-trust analysis
//!
//! Analyzes every address given on the command line and prints one JSON
//! document per address on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::{stream, StreamExt};
use mailscope_core::{AnalysisError, Engine};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{load_config, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "mailscope", version, about = "Email deliverability and domain-trust analysis")]
struct Args {
    /// Addresses to analyze
    #[arg(required = true, value_name = "EMAIL")]
    emails: Vec<String>,

    /// Probe SMTP servers in addition to DNS checks
    #[arg(long)]
    deep: bool,

    /// Maximum number of addresses analyzed at once
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Configuration file (defaults to ./Mailscope.toml when present)
    #[arg(long, env = "MAILSCOPE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if args.json_logs {
        config.observability.json_logs = true;
    }

    init_tracing(&config)?;

    info!("Starting mailscope v{}", env!("CARGO_PKG_VERSION"));

    let engine = Engine::new(config.engine_config()).context("Failed to initialize engine")?;
    let stats = engine.stats();
    info!("Engine initialized - {} disposable domains", stats.disposable_domains);

    let deep = args.deep;
    let mut results = stream::iter(args.emails)
        .map(|email| {
            let engine = engine.clone();
            async move {
                let outcome = engine.analyze(&email, deep).await;
                (email, outcome)
            }
        })
        .buffer_unordered(usize::from(args.concurrency));

    while let Some((email, outcome)) = results.next().await {
        let document = match outcome {
            Ok(result) => serde_json::to_value(&result)?,
            Err(err @ AnalysisError::RateLimited { .. }) => {
                warn!("Skipping rate-limited address");
                serde_json::json!({ "email": email, "error": err.to_string() })
            }
            Err(err) => serde_json::json!({ "email": email, "error": err.to_string() }),
        };
        println!("{}", serde_json::to_string_pretty(&document)?);
    }

    Ok(())
}

/// Initialize tracing and logging
fn init_tracing(config: &AppConfig) -> Result<()> {
    let level = &config.observability.log_level;
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mailscope={level},mailscope_core={level}").into());

    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
