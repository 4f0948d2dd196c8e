//! OpenTelemetry metrics exporter for the New Relic Event API.
//!
//! Converts OTLP metric batches into gzip-compressed JSON events, posts them
//! to an ingestion endpoint, and classifies each response following the
//! OTLP/HTTP failure rules so that the caller can decide whether to retry.
//!
//! # Example
//!
//! ```no_run
//! use nrevent_exporter::{Config, EventExporter, RetryPolicy};
//! use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(batch: ExportMetricsServiceRequest) -> nrevent_exporter::Result<()> {
//! let config = Config::load()?;
//! let exporter = EventExporter::new(config.exporter)?;
//! let policy = RetryPolicy::new(config.retry);
//! let cancel = CancellationToken::new();
//!
//! policy.execute(&cancel, || exporter.push(&cancel, &batch)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod config;
pub mod error;
pub mod exporter;
pub mod partial_success;
pub mod payload;
pub mod response;
pub mod retry;
pub mod telemetry;

pub use classify::{HttpOutcome, RpcStatus, StatusError, classify};
pub use config::{Config, ConfigBuilder, ConfigError, ExporterConfig, RetryConfig};
pub use error::{ExporterError, Result};
pub use exporter::{EventExporter, ExportError, ExporterBuilder};
pub use partial_success::{
    PartialSuccessError, PartialSuccessHandler, PartialSuccessReport,
    decode_metrics_partial_success,
};
pub use payload::{Event, EventPayload, EventPayloadBuilder, PayloadBuilder, PayloadError};
pub use response::{MAX_HTTP_RESPONSE_READ_BYTES, read_response_body};
pub use retry::RetryPolicy;
pub use telemetry::{EXPORTER_ID, ExporterTelemetry, RequestRecorder, RequestSample};
