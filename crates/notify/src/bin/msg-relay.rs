//! msg-relay — forwards SMS and call notifications from MQTT to a chat webhook.
//!
//! Subscribes to the configured topics, renders each message as one line of
//! text and POSTs it to `{wxAPI}/webhook/msg`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use relay_core::config::load_dotenv;
use relay_core::RelayConfig;
use relay_notify::{Dispatcher, Notifier, WebhookNotifier};
use relay_queue::{MqttSettings, MqttSubscriber};

// ── CLI ─────────────────────────────────────────────────────────────

/// Relay SMS and call messages from an MQTT broker to a chat webhook.
#[derive(Parser, Debug)]
#[command(name = "msg-relay", version, about)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "RELAY_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Write logs to this file (truncated on start) instead of stdout.
    #[arg(long, env = "RELAY_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Send one test notification to the recipient and exit.
    #[arg(long)]
    test_notify: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let loaded = RelayConfig::from_file(&cli.config);
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| loaded.as_ref().ok().and_then(|c| c.log_file.clone()));
    init_tracing(log_file.as_deref())?;

    let config = loaded
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    info!(path = %cli.config.display(), "loaded relay config");
    config.log_summary();

    let notifier = Arc::new(WebhookNotifier::from_config(&config)?);

    if cli.test_notify {
        let report = notifier.test(&config.recipient).await?;
        info!(endpoint = notifier.endpoint(), status = report.status, "test notification sent");
        return Ok(());
    }

    let dispatcher = Arc::new(Dispatcher::from_config(&config, notifier));
    let subscriber = MqttSubscriber::new(MqttSettings::from_config(&config)?);

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    tokio::spawn(async move {
        os_signal().await;
        info!("shutdown signal received");
        signal.notify_one();
    });

    info!("msg-relay starting");
    subscriber.run(dispatcher, shutdown).await?;
    info!("msg-relay exited cleanly");

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    );

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            _ => {
                tracing::warn!("failed to register unix signal handlers, falling back to ctrl_c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
