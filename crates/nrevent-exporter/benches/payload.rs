//! Benchmarks for metrics batch to event payload conversion.

use criterion::{Criterion, criterion_group, criterion_main};
use nrevent_exporter::{EventPayloadBuilder, PayloadBuilder};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::metrics::v1::{
    AggregationTemporality, Gauge, Histogram, HistogramDataPoint, Metric, NumberDataPoint,
    ResourceMetrics, ScopeMetrics, Sum, metric, number_data_point,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use std::hint::black_box;

fn string_attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

fn number_points(count: usize) -> Vec<NumberDataPoint> {
    (0..count)
        .map(|i| NumberDataPoint {
            attributes: vec![string_attr("host", &format!("host-{i}"))],
            time_unix_nano: 1_700_000_000_000_000_000,
            value: Some(number_data_point::Value::AsDouble(i as f64 * 1.5)),
            ..Default::default()
        })
        .collect()
}

fn make_batch(points_per_metric: usize) -> ExportMetricsServiceRequest {
    let histogram_points = (0..points_per_metric)
        .map(|i| HistogramDataPoint {
            attributes: vec![string_attr("route", &format!("/api/{i}"))],
            time_unix_nano: 1_700_000_000_000_000_000,
            count: 10,
            sum: Some(123.4),
            min: Some(0.5),
            max: Some(42.0),
            bucket_counts: vec![2, 3, 5],
            explicit_bounds: vec![1.0, 10.0],
            ..Default::default()
        })
        .collect();

    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(Resource {
                attributes: vec![string_attr("service.name", "bench")],
                ..Default::default()
            }),
            scope_metrics: vec![ScopeMetrics {
                metrics: vec![
                    Metric {
                        name: "cpu.usage".to_string(),
                        data: Some(metric::Data::Gauge(Gauge {
                            data_points: number_points(points_per_metric),
                        })),
                        ..Default::default()
                    },
                    Metric {
                        name: "requests".to_string(),
                        data: Some(metric::Data::Sum(Sum {
                            data_points: number_points(points_per_metric),
                            aggregation_temporality: AggregationTemporality::Delta as i32,
                            is_monotonic: true,
                        })),
                        ..Default::default()
                    },
                    Metric {
                        name: "latency".to_string(),
                        unit: "ms".to_string(),
                        data: Some(metric::Data::Histogram(Histogram {
                            data_points: histogram_points,
                            aggregation_temporality: AggregationTemporality::Cumulative as i32,
                        })),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn bench_events(c: &mut Criterion) {
    let builder = EventPayloadBuilder::new();
    let batch = make_batch(100);

    c.bench_function("EventPayloadBuilder::events", |b| {
        b.iter(|| builder.events(black_box(&batch), black_box("OtelMetric")))
    });
}

fn bench_build(c: &mut Criterion) {
    let builder = EventPayloadBuilder::new();
    let batch = make_batch(100);

    c.bench_function("EventPayloadBuilder::build", |b| {
        b.iter(|| builder.build(black_box(&batch), black_box("OtelMetric")))
    });
}

fn bench_build_large_batch(c: &mut Criterion) {
    let builder = EventPayloadBuilder::new();
    let batch = make_batch(2_000);

    c.bench_function("EventPayloadBuilder::build_large", |b| {
        b.iter(|| builder.build(black_box(&batch), black_box("OtelMetric")))
    });
}

criterion_group!(benches, bench_events, bench_build, bench_build_large_batch);
criterion_main!(benches);
