//! Wallhaven relay daemon
//!
//! Runs the poll/publish loop until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use openai_client::OpenAIClient;
use relay_core::sinks::build_sinks;
use relay_core::{
    Config, FanOut, HttpArtifactFetcher, ItemPipeline, OpenAIDescriber, Poller, Scheduler,
    SchedulerConfig, SqliteLedger, WallhavenCatalog,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallhaven_client::WallhavenClient;

#[derive(Debug, Parser)]
#[command(name = "relay", version, about = "Relay new Wallhaven wallpapers to Matrix, Mastodon and ntfy")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relay_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(config = %cli.config.display(), "Starting Wallhaven relay");

    let config = Config::load(&cli.config)?;

    let ledger = Arc::new(
        SqliteLedger::open(&config.database)
            .await
            .with_context(|| format!("Failed to open ledger {}", config.database.display()))?,
    );

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let wallhaven = WallhavenClient::new(&config.wallhaven.api_token, &config.wallhaven.user_agent)
        .with_client(http.clone());
    let catalog = Arc::new(WallhavenCatalog::new(
        wallhaven,
        config.wallhaven.search_params(),
    ));

    let sinks = build_sinks(&config, http.clone())
        .await
        .context("Failed to set up sinks")?;

    let mut pipeline = ItemPipeline::new(
        Arc::new(HttpArtifactFetcher::new(http.clone()).with_timeout(config.request_timeout())),
        FanOut::new(sinks),
        ledger.clone(),
    );
    if config.openai_key.is_empty() {
        tracing::warn!("No OpenAI key configured, descriptions disabled");
    } else {
        let openai = OpenAIClient::new(&config.openai_key).with_http_client(http.clone());
        pipeline = pipeline.with_describer(Arc::new(OpenAIDescriber::new(
            openai,
            &config.openai_model,
        )));
    }

    let poller = Poller::new(catalog, ledger, config.wallhaven.toprange.clone());
    let scheduler = Scheduler::new(
        poller,
        Arc::new(pipeline),
        SchedulerConfig {
            max_concurrent: config.max_concurrent_items,
            interval: config.wait_time(),
        },
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(listen_for_shutdown(shutdown.clone()));

    if cli.once {
        let report = scheduler.run_once(&shutdown).await;
        tracing::info!(?report, "Single cycle finished");
    } else {
        scheduler.run(shutdown).await;
    }

    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn listen_for_shutdown(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Received shutdown signal");
    token.cancel();
}
