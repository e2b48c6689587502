//! postdeck-server - HTTP API and scheduler for social posts
//!
//! Serves the dashboard API and runs the due-post scheduler in the same
//! process.

use anyhow::Context;
use clap::Parser;
use libpostdeck::logging::{LogFormat, LoggingConfig};
use libpostdeck::{Config, PostdeckService};
use postdeck_server::{http, AppState};
use std::path::PathBuf;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "postdeck-server")]
#[command(version)]
#[command(about = "HTTP API and scheduler for drafting, approving and publishing social posts")]
#[command(long_about = "\
postdeck-server - HTTP API and scheduler for social posts

DESCRIPTION:
    Serves the dashboard API (post generation, approval, publishing, platform
    connections) and publishes scheduled posts when they come due.

USAGE:
    # Serve on the configured address
    postdeck-server

    # Custom bind address and scan interval
    postdeck-server --bind 127.0.0.1:9000 --poll-interval 30s

    # Publish whatever is due right now and exit
    postdeck-server --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (in-flight requests finish)

CONFIGURATION:
    Configuration file: ~/.config/postdeck/config.toml
    Database location: ~/.local/share/postdeck/posts.db

    [scheduler]
    poll_interval = \"60s\"

    Platform tokens and API keys may also come from the environment
    (OPENAI_API_KEY, LINKEDIN_ACCESS_TOKEN, TWITTER_ACCESS_TOKEN, ...).

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "POSTDECK_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(long, env = "POSTDECK_BIND", value_name = "ADDR")]
    bind: Option<String>,

    /// Interval between due-post scans, e.g. "30s" or "2m" (overrides config)
    #[arg(long, value_name = "DURATION")]
    poll_interval: Option<String>,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Process due posts once and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.verbose = cli.verbose;
    logging.init();

    let config = load_config(&cli)?;
    let bind = config.server.bind.clone();
    let service = PostdeckService::from_config(config)
        .await
        .context("failed to initialise service")?;

    info!("postdeck-server starting");

    if cli.once {
        let summary = service.scheduler().process_due_posts().await?;
        info!(
            due = summary.due,
            posted = summary.posted,
            failed = summary.failed,
            "processed due posts once, exiting"
        );
        return Ok(());
    }

    service.scheduler().start().await?;
    let state = AppState::new(service);

    let app = http::router(state.clone()).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.service.scheduler().shutdown().await;
    info!("postdeck-server stopped");
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        None => Config::load()?,
    };

    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(interval) = &cli.poll_interval {
        config.scheduler.poll_interval = interval.clone();
    }
    // validate before anything starts
    config.scheduler.poll_interval()?;

    Ok(config)
}

#[cfg(unix)]
async fn shutdown_signal() {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            warn!(error = %err, "failed to install signal handlers");
            std::future::pending::<()>().await;
            return;
        }
    };

    if let Some(signal) = signals.next().await {
        info!(signal, "Received shutdown signal, stopping gracefully...");
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, stopping gracefully...");
}
