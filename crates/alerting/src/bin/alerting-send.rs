//! alerting-send - build a receiver's integrations and fire a test alert.
//!
//! Exits non-zero if any channel is misconfigured or any delivery fails.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use alerting::{
    Alert, BoxError, ClientConfig, EmailSender, IntegrationFactory, Metadata, ReceiverConfig,
    SenderFactory, WebhookClient, WebhookSender,
};

/// Send a test alert through every channel of a receiver.
#[derive(Parser)]
#[command(name = "alerting-send")]
#[command(about = "Validate a receiver and send a test alert to each of its channels")]
#[command(version)]
struct Cli {
    /// Receiver configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Name of the test alert
    #[arg(long, default_value = "TestAlert")]
    alert_name: String,

    /// Send the alert as resolved
    #[arg(long)]
    resolved: bool,

    /// Only build integrations, send nothing
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// One shared webhook client for every channel; no email transport.
struct CliSenders {
    client: WebhookClient,
}

impl SenderFactory for CliSenders {
    fn build_webhook_sender(&self, _meta: &Metadata) -> Result<Arc<dyn WebhookSender>, BoxError> {
        Ok(Arc::new(self.client.clone()))
    }

    fn build_email_sender(&self, _meta: &Metadata) -> Result<Arc<dyn EmailSender>, BoxError> {
        Err("email delivery is not configured for alerting-send".into())
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("alerting=debug,alerting_send=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alerting=info,warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let raw = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read {}", cli.config.display()))?;
    let receiver = ReceiverConfig::from_json(&raw)
        .with_context(|| format!("Failed to parse receiver config {}", cli.config.display()))?;

    let client = WebhookClient::new(ClientConfig::from_env()).context("Failed to build HTTP client")?;
    let factory = IntegrationFactory::new(Arc::new(CliSenders { client }));

    let integrations = match factory.build(&receiver) {
        Ok(integrations) => integrations,
        Err(errors) => {
            for e in &errors {
                error!(channel_type = %e.channel_type(), uid = %e.uid(), "{e}");
            }
            eprintln!("receiver {} has {} misconfigured channel(s)", receiver.name, errors.len());
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.dry_run {
        info!(receiver = %receiver.name, integrations = integrations.len(), "Dry run, nothing sent");
        return Ok(ExitCode::SUCCESS);
    }

    let mut alert = Alert::new(cli.alert_name)
        .with_label("receiver", receiver.name.clone())
        .with_annotation("summary", "Test notification sent by alerting-send");
    if cli.resolved {
        alert = alert.resolved_at(Utc::now());
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight requests");
            shutdown.cancel();
        }
    });

    let alerts = [alert];
    let mut failures = 0usize;
    for integration in &integrations {
        if cli.resolved && !integration.send_resolved() {
            info!(name = integration.name(), "Skipping, resolved messages disabled");
            continue;
        }
        match integration.notify(&cancel, &alerts).await {
            Ok(()) => info!(
                channel_type = %integration.channel_type(),
                name = integration.name(),
                "Delivered"
            ),
            Err(e) => {
                failures += 1;
                error!(
                    channel_type = %integration.channel_type(),
                    name = integration.name(),
                    error = %e,
                    "Delivery failed"
                );
            }
        }
    }

    if failures > 0 {
        eprintln!("{failures} of {} deliveries failed", integrations.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
