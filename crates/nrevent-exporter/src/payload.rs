//! OTLP metrics to event payload conversion.
//!
//! Each metric data point becomes one flat JSON event carrying the metric
//! identity, its value fields and the merged resource and data point
//! attributes. The serialised array is gzip-compressed, ready to be posted.

use flate2::Compression;
use flate2::write::GzEncoder;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::metrics::v1::{Metric, metric::Data, number_data_point};
use serde_json::{Map, Number, Value};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single event: a flat map of attribute names to scalar values.
pub type Event = Map<String, Value>;

/// A serialised, compressed batch of events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPayload {
    /// Gzip-compressed JSON array of events.
    pub body: Vec<u8>,
    /// Number of events in `body`.
    pub item_count: usize,
}

/// Error building a payload.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Events could not be serialised.
    #[error("failed to serialise events")]
    Serialise(#[source] serde_json::Error),

    /// Serialised events could not be compressed.
    #[error("failed to compress payload")]
    Compress(#[source] std::io::Error),
}

/// Converts a metrics batch into a ready-to-send payload.
pub trait PayloadBuilder: Send + Sync {
    /// Builds the payload for `batch`, labelling every event with `event_type`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] if the batch cannot be converted.
    fn build(
        &self,
        batch: &ExportMetricsServiceRequest,
        event_type: &str,
    ) -> Result<EventPayload, PayloadError>;
}

/// Default builder producing one event per data point.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventPayloadBuilder;

impl EventPayloadBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self
    }

    /// Converts a batch into uncompressed events.
    pub fn events(&self, batch: &ExportMetricsServiceRequest, event_type: &str) -> Vec<Event> {
        let mut events = Vec::new();

        for resource_metrics in &batch.resource_metrics {
            let mut resource_base = Event::new();
            if let Some(resource) = &resource_metrics.resource {
                insert_attributes(&mut resource_base, &resource.attributes);
            }

            for scope_metrics in &resource_metrics.scope_metrics {
                let mut scope_base = resource_base.clone();
                if let Some(scope) = &scope_metrics.scope {
                    if !scope.name.is_empty() {
                        scope_base.insert("otel.library.name".into(), scope.name.clone().into());
                    }
                    if !scope.version.is_empty() {
                        scope_base
                            .insert("otel.library.version".into(), scope.version.clone().into());
                    }
                }

                for metric in &scope_metrics.metrics {
                    convert_metric(&mut events, &scope_base, metric, event_type);
                }
            }
        }

        events
    }
}

impl PayloadBuilder for EventPayloadBuilder {
    fn build(
        &self,
        batch: &ExportMetricsServiceRequest,
        event_type: &str,
    ) -> Result<EventPayload, PayloadError> {
        let events = self.events(batch, event_type);
        let json = serde_json::to_vec(&events).map_err(PayloadError::Serialise)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(PayloadError::Compress)?;
        let body = encoder.finish().map_err(PayloadError::Compress)?;

        tracing::debug!(
            events = events.len(),
            uncompressed = json.len(),
            compressed = body.len(),
            "Built event payload"
        );

        Ok(EventPayload {
            body,
            item_count: events.len(),
        })
    }
}

/// Shape of a batch: resource metrics, metrics and data points.
pub fn batch_shape(batch: &ExportMetricsServiceRequest) -> (usize, usize, usize) {
    let mut metrics = 0;
    let mut data_points = 0;

    for resource_metrics in &batch.resource_metrics {
        for scope_metrics in &resource_metrics.scope_metrics {
            metrics += scope_metrics.metrics.len();
            data_points += scope_metrics
                .metrics
                .iter()
                .map(data_point_count)
                .sum::<usize>();
        }
    }

    (batch.resource_metrics.len(), metrics, data_points)
}

fn data_point_count(metric: &Metric) -> usize {
    match &metric.data {
        Some(Data::Gauge(gauge)) => gauge.data_points.len(),
        Some(Data::Sum(sum)) => sum.data_points.len(),
        Some(Data::Histogram(histogram)) => histogram.data_points.len(),
        Some(Data::ExponentialHistogram(histogram)) => histogram.data_points.len(),
        Some(Data::Summary(summary)) => summary.data_points.len(),
        None => 0,
    }
}

fn convert_metric(events: &mut Vec<Event>, base: &Event, metric: &Metric, event_type: &str) {
    let new_event = |attributes: &[KeyValue], metric_type: &str, time_unix_nano: u64| {
        let mut event = base.clone();
        insert_attributes(&mut event, attributes);
        event.insert("eventType".into(), event_type.into());
        event.insert("metricName".into(), metric.name.clone().into());
        event.insert("metricType".into(), metric_type.into());
        if !metric.description.is_empty() {
            event.insert("metricDescription".into(), metric.description.clone().into());
        }
        if !metric.unit.is_empty() {
            event.insert("metricUnit".into(), metric.unit.clone().into());
        }
        event.insert("timestamp".into(), timestamp_millis(time_unix_nano).into());
        event
    };

    match &metric.data {
        Some(Data::Gauge(gauge)) => {
            for point in &gauge.data_points {
                let Some(value) = number_value(point.value.as_ref()) else {
                    tracing::debug!(
                        metric = %metric.name,
                        "Skipping gauge point without a finite value"
                    );
                    continue;
                };
                let mut event = new_event(&point.attributes, "gauge", point.time_unix_nano);
                event.insert("value".into(), value);
                events.push(event);
            }
        }
        Some(Data::Sum(sum)) => {
            for point in &sum.data_points {
                let Some(value) = number_value(point.value.as_ref()) else {
                    tracing::debug!(
                        metric = %metric.name,
                        "Skipping sum point without a finite value"
                    );
                    continue;
                };
                let mut event = new_event(&point.attributes, "sum", point.time_unix_nano);
                event.insert("value".into(), value);
                event.insert(
                    "aggregationTemporality".into(),
                    temporality(sum.aggregation_temporality).into(),
                );
                event.insert("isMonotonic".into(), sum.is_monotonic.into());
                events.push(event);
            }
        }
        Some(Data::Histogram(histogram)) => {
            for point in &histogram.data_points {
                let mut event = new_event(&point.attributes, "histogram", point.time_unix_nano);
                event.insert("count".into(), point.count.into());
                insert_float(&mut event, "sum", point.sum);
                insert_float(&mut event, "min", point.min);
                insert_float(&mut event, "max", point.max);
                event.insert(
                    "aggregationTemporality".into(),
                    temporality(histogram.aggregation_temporality).into(),
                );
                events.push(event);
            }
        }
        Some(Data::ExponentialHistogram(histogram)) => {
            for point in &histogram.data_points {
                let mut event =
                    new_event(&point.attributes, "exponentialHistogram", point.time_unix_nano);
                event.insert("count".into(), point.count.into());
                insert_float(&mut event, "sum", point.sum);
                insert_float(&mut event, "min", point.min);
                insert_float(&mut event, "max", point.max);
                event.insert(
                    "aggregationTemporality".into(),
                    temporality(histogram.aggregation_temporality).into(),
                );
                events.push(event);
            }
        }
        Some(Data::Summary(summary)) => {
            for point in &summary.data_points {
                let mut event = new_event(&point.attributes, "summary", point.time_unix_nano);
                event.insert("count".into(), point.count.into());
                insert_float(&mut event, "sum", Some(point.sum));
                for quantile in &point.quantile_values {
                    if quantile.quantile == 0.0 {
                        insert_float(&mut event, "min", Some(quantile.value));
                    } else if quantile.quantile == 1.0 {
                        insert_float(&mut event, "max", Some(quantile.value));
                    }
                }
                events.push(event);
            }
        }
        None => {
            tracing::debug!(metric = %metric.name, "Skipping metric without data");
        }
    }
}

fn number_value(value: Option<&number_data_point::Value>) -> Option<Value> {
    match value? {
        number_data_point::Value::AsInt(v) => Some((*v).into()),
        number_data_point::Value::AsDouble(v) => Number::from_f64(*v).map(Value::Number),
    }
}

fn insert_float(event: &mut Event, key: &str, value: Option<f64>) {
    if let Some(number) = value.and_then(Number::from_f64) {
        event.insert(key.to_string(), Value::Number(number));
    }
}

fn temporality(value: i32) -> &'static str {
    match value {
        1 => "delta",
        2 => "cumulative",
        _ => "unspecified",
    }
}

fn timestamp_millis(time_unix_nano: u64) -> u64 {
    let nanos = if time_unix_nano == 0 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    } else {
        time_unix_nano
    };
    nanos / 1_000_000
}

fn insert_attributes(event: &mut Event, attributes: &[KeyValue]) {
    for attribute in attributes {
        if let Some(value) = attribute.value.as_ref().and_then(attribute_value) {
            event.insert(attribute.key.clone(), value);
        }
    }
}

/// Events only carry scalars; structured values are flattened to JSON text.
fn attribute_value(value: &AnyValue) -> Option<Value> {
    match value.value.as_ref()? {
        any_value::Value::StringValue(s) => Some(Value::String(s.clone())),
        any_value::Value::BoolValue(b) => Some(Value::Bool(*b)),
        any_value::Value::IntValue(i) => Some((*i).into()),
        any_value::Value::DoubleValue(d) => Number::from_f64(*d).map(Value::Number),
        any_value::Value::BytesValue(bytes) => Some(Value::String(hex::encode(bytes))),
        any_value::Value::ArrayValue(_) | any_value::Value::KvlistValue(_) => {
            Some(Value::String(structured_value(value).to_string()))
        }
    }
}

fn structured_value(value: &AnyValue) -> Value {
    match value.value.as_ref() {
        Some(any_value::Value::ArrayValue(array)) => {
            Value::Array(array.values.iter().map(structured_value).collect())
        }
        Some(any_value::Value::KvlistValue(list)) => Value::Object(
            list.values
                .iter()
                .map(|kv| {
                    let value = kv.value.as_ref().map(structured_value).unwrap_or(Value::Null);
                    (kv.key.clone(), value)
                })
                .collect(),
        ),
        Some(_) => attribute_value(value).unwrap_or(Value::Null),
        None => Value::Null,
    }
}
