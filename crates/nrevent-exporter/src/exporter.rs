//! Event API exporter.
//!
//! This module provides the export pipeline: a metrics batch is converted into
//! an event payload, posted to the ingestion endpoint, and the response is
//! classified into success, retryable failure or permanent failure. Retrying
//! is left to the caller (see [`crate::retry`]).

use crate::classify::{HttpOutcome, StatusError, classify};
use crate::config::{ConfigError, ExporterConfig};
use crate::partial_success::{
    PartialSuccessError, PartialSuccessHandler, decode_metrics_partial_success,
};
use crate::payload::{
    EventPayload, EventPayloadBuilder, PayloadBuilder, PayloadError, batch_shape,
};
use crate::response::{drain_response_body, read_response_body};
use crate::telemetry::{ExporterTelemetry, RequestRecorder, RequestSample};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const API_KEY_HEADER: &str = "Api-Key";

/// Error during export.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The request could not be constructed.
    #[error("failed to build HTTP request")]
    Request(#[source] reqwest::Error),

    /// No response was received.
    #[error("failed to make an HTTP request")]
    Transport(#[source] reqwest::Error),

    /// The caller cancelled the export before a response arrived.
    #[error("export cancelled")]
    Cancelled,

    /// The server rejected the request but a retry may succeed.
    #[error("{error}")]
    Retryable {
        /// Failure details.
        error: StatusError,
        /// Server-suggested delay; zero means the caller's default backoff.
        retry_after: Duration,
    },

    /// The server rejected the request and a retry will not help.
    #[error(transparent)]
    Permanent(StatusError),

    /// The batch could not be converted into a payload.
    #[error("failed to build event payload")]
    Payload(#[from] PayloadError),

    /// A 2xx partial-success body was recognised but malformed.
    #[error(transparent)]
    PartialSuccess(#[from] PartialSuccessError),

    /// A 2xx response body could not be read.
    #[error("failed to read response body")]
    ResponseBody(#[source] reqwest::Error),
}

impl ExportError {
    /// Whether the owning layer should retry the export.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. } | Self::Transport(_))
    }

    /// Whether the data can never be delivered as-is.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Permanent(_) | Self::Payload(_))
    }

    /// Server-suggested delay before the next attempt.
    ///
    /// `Some(Duration::ZERO)` means the server gave no usable hint.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Retryable { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// HTTP status code of the response that caused the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Retryable { error, .. } | Self::Permanent(error) => Some(error.status),
            _ => None,
        }
    }
}

impl From<HttpOutcome> for Result<(), ExportError> {
    fn from(outcome: HttpOutcome) -> Self {
        match outcome {
            HttpOutcome::Success => Ok(()),
            HttpOutcome::Retryable { error, retry_after } => {
                Err(ExportError::Retryable { error, retry_after })
            }
            HttpOutcome::Permanent { error } => Err(ExportError::Permanent(error)),
        }
    }
}

/// Builder for [`EventExporter`].
#[must_use = "builders do nothing unless .build() is called"]
pub struct ExporterBuilder {
    config: ExporterConfig,
    client: Option<Client>,
    payload_builder: Option<Arc<dyn PayloadBuilder>>,
    telemetry: Option<Arc<dyn RequestRecorder>>,
}

impl ExporterBuilder {
    fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            client: None,
            payload_builder: None,
            telemetry: None,
        }
    }

    /// Uses a pre-built HTTP client instead of one built from the config.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Replaces the default [`EventPayloadBuilder`].
    pub fn payload_builder(mut self, builder: Arc<dyn PayloadBuilder>) -> Self {
        self.payload_builder = Some(builder);
        self
    }

    /// Sets the telemetry recorder. Defaults to counters on the global meter.
    pub fn telemetry(mut self, telemetry: Arc<dyn RequestRecorder>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Validates the endpoint and builds the exporter.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics URL is missing or invalid, or the
    /// HTTP client cannot be created.
    pub fn build(self) -> crate::Result<EventExporter> {
        let metrics_url = self.config.metrics_url()?;

        if self.config.api_key.is_empty() {
            tracing::warn!("No API key configured, requests will likely be rejected");
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.config.timeout)
                .build()
                .map_err(crate::ExporterError::Client)?,
        };

        Ok(EventExporter {
            metrics_url,
            config: self.config,
            client,
            payload_builder: self
                .payload_builder
                .unwrap_or_else(|| Arc::new(EventPayloadBuilder::new())),
            telemetry: self
                .telemetry
                .unwrap_or_else(|| Arc::new(ExporterTelemetry::global())),
        })
    }
}

/// Exporter posting metric events to the ingestion endpoint.
///
/// Cheap to share behind an `Arc`; concurrent exports are independent.
pub struct EventExporter {
    config: ExporterConfig,
    metrics_url: String,
    client: Client,
    payload_builder: Arc<dyn PayloadBuilder>,
    telemetry: Arc<dyn RequestRecorder>,
}

impl EventExporter {
    /// Creates an exporter with default client, payload builder and telemetry.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics URL is missing or invalid, or the
    /// HTTP client cannot be created.
    pub fn new(config: ExporterConfig) -> crate::Result<Self> {
        Self::builder(config).build()
    }

    /// Creates a builder for an exporter.
    pub fn builder(config: ExporterConfig) -> ExporterBuilder {
        ExporterBuilder::new(config)
    }

    /// Returns the URL metrics are posted to.
    pub fn metrics_url(&self) -> &str {
        &self.metrics_url
    }

    /// Converts a metrics batch into events and exports them.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Payload`] if the batch cannot be converted,
    /// otherwise whatever [`EventExporter::export`] returns.
    pub async fn push(
        &self,
        cancel: &CancellationToken,
        batch: &ExportMetricsServiceRequest,
    ) -> Result<(), ExportError> {
        let (resource_metrics, metrics, data_points) = batch_shape(batch);
        tracing::info!(resource_metrics, metrics, data_points, "Exporting metrics");

        let payload = self.payload_builder.build(batch, &self.config.event_type)?;
        tracing::debug!(
            compressed_size = payload.body.len(),
            events = payload.item_count,
            "Event payload built"
        );

        self.export(
            cancel,
            &self.metrics_url,
            payload,
            decode_metrics_partial_success,
        )
        .await
    }

    /// Posts a pre-built payload and classifies the response.
    ///
    /// Exactly one telemetry sample is recorded for every response received,
    /// whatever its status.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`] describing why the export failed and
    /// whether it may be retried.
    pub async fn export(
        &self,
        cancel: &CancellationToken,
        url: &str,
        payload: EventPayload,
        partial_success_handler: PartialSuccessHandler,
    ) -> Result<(), ExportError> {
        let start = Instant::now();
        let bytes = payload.body.len() as u64;

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(CONTENT_ENCODING, "gzip")
            .body(payload.body)
            .build()
            .map_err(ExportError::Request)?;

        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            result = self.client.execute(request) => result.map_err(ExportError::Transport)?,
        };

        self.telemetry.record(&RequestSample {
            duration: start.elapsed(),
            status_code: response.status().as_u16(),
            endpoint: url,
            bytes,
            records: payload.item_count as u64,
        });

        let result = handle_response(url, &mut response, partial_success_handler).await;

        drain_response_body(&mut response).await;
        drop(response);

        result
    }
}

async fn handle_response(
    url: &str,
    response: &mut Response,
    partial_success_handler: PartialSuccessHandler,
) -> Result<(), ExportError> {
    let status = response.status().as_u16();

    if response.status().is_success() {
        let body = read_response_body(response)
            .await
            .map_err(ExportError::ResponseBody)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        if let Some(report) = partial_success_handler(&body, content_type)? {
            tracing::warn!(
                message = %report.error_message,
                dropped_data_points = report.rejected_count,
                "Partial success response"
            );
        }
        return Ok(());
    }

    let body = if (400..=599).contains(&status) {
        read_response_body(response).await.ok()
    } else {
        None
    };

    let result: Result<(), ExportError> =
        classify(url, status, response.headers(), body.as_deref()).into();

    if let Err(ref e) = result {
        tracing::debug!(status, retryable = e.is_retryable(), error = %e, "Export rejected");
    }

    result
}

/// Checks a configuration without building a client.
///
/// # Errors
///
/// Returns [`ConfigError`] if the metrics URL is missing or invalid.
pub fn validate_config(config: &ExporterConfig) -> Result<(), ConfigError> {
    config.metrics_url().map(|_| ())
}
