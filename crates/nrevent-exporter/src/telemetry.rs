//! Self-telemetry for export requests.
//!
//! Every completed HTTP round trip is recorded once against four counters,
//! tagged with the response status, the endpoint and the exporter id.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Meter};
use std::time::Duration;

/// Value of the `exporter` attribute.
pub const EXPORTER_ID: &str = "nreventexporter";

/// One completed export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSample<'a> {
    /// Wall-clock time from request construction to response headers.
    pub duration: Duration,
    /// HTTP status code of the response.
    pub status_code: u16,
    /// URL the request was sent to.
    pub endpoint: &'a str,
    /// Request body size in bytes.
    pub bytes: u64,
    /// Number of events in the request.
    pub records: u64,
}

/// Sink for per-request telemetry.
///
/// Implementations are shared between concurrent exports and must not block.
pub trait RequestRecorder: Send + Sync {
    /// Records one completed request.
    fn record(&self, sample: &RequestSample<'_>);
}

/// Records requests on OpenTelemetry counters.
#[derive(Debug, Clone)]
pub struct ExporterTelemetry {
    requests_duration: Counter<u64>,
    requests_bytes: Counter<u64>,
    requests_records: Counter<u64>,
    requests_sent: Counter<u64>,
}

impl ExporterTelemetry {
    /// Creates the instruments on the given meter.
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests_duration: meter
                .u64_counter("exporter.requests.duration")
                .with_description("Time spent sending export requests")
                .with_unit("ms")
                .build(),
            requests_bytes: meter
                .u64_counter("exporter.requests.bytes")
                .with_description("Bytes sent in export requests")
                .with_unit("By")
                .build(),
            requests_records: meter
                .u64_counter("exporter.requests.records")
                .with_description("Events sent in export requests")
                .with_unit("{records}")
                .build(),
            requests_sent: meter
                .u64_counter("exporter.requests.sent")
                .with_description("Export requests that received a response")
                .with_unit("{requests}")
                .build(),
        }
    }

    /// Creates the instruments on the globally registered meter provider.
    pub fn global() -> Self {
        Self::new(&opentelemetry::global::meter(EXPORTER_ID))
    }
}

impl RequestRecorder for ExporterTelemetry {
    fn record(&self, sample: &RequestSample<'_>) {
        tracing::debug!(
            status_code = sample.status_code,
            endpoint = sample.endpoint,
            count = sample.records,
            "Exporter request"
        );

        let attributes = attributes(sample);
        self.requests_duration
            .add(sample.duration.as_millis() as u64, &attributes);
        self.requests_bytes.add(sample.bytes, &attributes);
        self.requests_records.add(sample.records, &attributes);
        self.requests_sent.add(1, &attributes);
    }
}

fn attributes(sample: &RequestSample<'_>) -> [KeyValue; 3] {
    [
        KeyValue::new("status_code", sample.status_code.to_string()),
        KeyValue::new("endpoint", sample.endpoint.to_string()),
        KeyValue::new("exporter", EXPORTER_ID),
    ]
}
