//! Event API exporter binary.
//!
//! Reads one OTLP metrics export request from a file and sends it to the
//! configured ingestion endpoint, retrying according to the retry settings.
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of priority):
//! 1. Default values
//! 2. Config file: `/etc/nrevent-exporter/config.toml`, or `--config PATH`
//! 3. `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_EXPORTER_OTLP_METRICS_ENDPOINT`
//!    and `NEW_RELIC_API_KEY`
//! 4. Environment variables with `NREVENT_` prefix
//!
//! # Input
//!
//! Files ending in `.json` are parsed as OTLP JSON; anything else is decoded
//! as a protobuf `ExportMetricsServiceRequest`.

use anyhow::{Context, Result};
use clap::Parser;
use nrevent_exporter::{Config, EventExporter, ExporterTelemetry, RetryPolicy};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use prost::Message;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about = "Export OTLP metrics as New Relic events")]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OTLP metrics request to export (`.json` or protobuf).
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing().context("failed to initialise tracing subscriber")?;

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    tracing::debug!(
        retry = ?config.retry,
        event_type = %config.exporter.event_type,
        "Configuration loaded"
    );

    let exporter = EventExporter::builder(config.exporter)
        .telemetry(Arc::new(ExporterTelemetry::global()))
        .build()
        .context("failed to create exporter")?;
    let policy = RetryPolicy::new(config.retry);

    let batch = read_request(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling export");
            shutdown.cancel();
        }
    });

    policy
        .execute(&cancel, || exporter.push(&cancel, &batch))
        .await
        .context("export failed")?;

    tracing::info!(url = exporter.metrics_url(), "Export complete");
    Ok(())
}

fn read_request(path: &Path) -> Result<ExportMetricsServiceRequest> {
    let bytes = std::fs::read(path)?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_slice(&bytes).context("invalid OTLP JSON")
    } else {
        ExportMetricsServiceRequest::decode(bytes.as_slice()).context("invalid OTLP protobuf")
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nrevent_exporter=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).without_time())
        .with(filter)
        .try_init()
        .context("failed to initialise tracing registry")?;

    Ok(())
}
