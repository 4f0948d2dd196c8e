//! Shared test utilities for exporter integration tests.

#![allow(dead_code)]

use nrevent_exporter::{
    Config, EventExporter, EventPayload, PayloadBuilder, PayloadError, RequestRecorder,
    RequestSample,
};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::metrics::v1::{
    Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, metric, number_data_point,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const API_KEY: &str = "test-api-key";

/// Builds a batch holding one gauge with the given number of data points.
pub fn gauge_batch(name: &str, points: usize) -> ExportMetricsServiceRequest {
    let data_points = (0..points)
        .map(|i| NumberDataPoint {
            attributes: vec![KeyValue {
                key: "host".to_string(),
                value: Some(AnyValue {
                    value: Some(any_value::Value::StringValue(format!("host-{i}"))),
                }),
            }],
            time_unix_nano: 1_700_000_000_000_000_000,
            value: Some(number_data_point::Value::AsDouble(i as f64)),
            ..Default::default()
        })
        .collect();

    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            scope_metrics: vec![ScopeMetrics {
                metrics: vec![Metric {
                    name: name.to_string(),
                    data: Some(metric::Data::Gauge(Gauge { data_points })),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Exporter pointed at `endpoint` with a recording telemetry sink.
pub fn exporter(endpoint: &str) -> (EventExporter, Arc<RecordingTelemetry>) {
    let telemetry = Arc::new(RecordingTelemetry::default());
    let config = Config::builder()
        .endpoint(endpoint)
        .api_key(API_KEY)
        .timeout(Duration::from_secs(5))
        .build();

    let exporter = EventExporter::builder(config.exporter)
        .telemetry(telemetry.clone())
        .build()
        .expect("failed to build exporter");

    (exporter, telemetry)
}

/// Owned copy of a [`RequestSample`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSample {
    pub status_code: u16,
    pub endpoint: String,
    pub bytes: u64,
    pub records: u64,
}

/// Telemetry sink that keeps every sample it receives.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    samples: Mutex<Vec<RecordedSample>>,
}

impl RecordingTelemetry {
    pub fn samples(&self) -> Vec<RecordedSample> {
        self.samples.lock().unwrap().clone()
    }
}

impl RequestRecorder for RecordingTelemetry {
    fn record(&self, sample: &RequestSample<'_>) {
        self.samples.lock().unwrap().push(RecordedSample {
            status_code: sample.status_code,
            endpoint: sample.endpoint.to_string(),
            bytes: sample.bytes,
            records: sample.records,
        });
    }
}

/// Payload builder returning a fixed body and item count.
pub struct FixedPayloadBuilder {
    pub body: Vec<u8>,
    pub item_count: usize,
}

impl PayloadBuilder for FixedPayloadBuilder {
    fn build(
        &self,
        _batch: &ExportMetricsServiceRequest,
        _event_type: &str,
    ) -> Result<EventPayload, PayloadError> {
        Ok(EventPayload {
            body: self.body.clone(),
            item_count: self.item_count,
        })
    }
}

/// Starts a one-shot HTTP server that answers with a 200 and `body_len`
/// bytes, without a `Content-Length` header, then closes the connection.
pub async fn start_unsized_body_server(body_len: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("listener has no address");

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };

        let mut request = [0u8; 4096];
        let _ = stream.read(&mut request).await;

        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n";
        if stream.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let _ = stream.write_all(&vec![b'x'; body_len]).await;
        let _ = stream.shutdown().await;
    });

    addr
}
