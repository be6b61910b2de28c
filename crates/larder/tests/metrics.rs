// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tests for the OpenTelemetry event counter.

use std::convert::Infallible;

use bytes::Bytes;
use http::{Request, Response};
use larder::ResponseCacheBuilder;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::{
    InMemoryMetricExporter, SdkMeterProvider,
    data::{AggregatedMetrics, MetricData, ResourceMetrics, ScopeMetrics},
};

struct MetricTester {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl MetricTester {
    fn new() -> Self {
        let exporter = InMemoryMetricExporter::default();
        Self {
            provider: SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build(),
            exporter,
        }
    }

    /// Sums the `larder.event.count` data points carrying every attribute in `filter`.
    fn count(&self, filter: &[KeyValue]) -> u64 {
        self.provider.force_flush().expect("flush succeeds");
        let metrics = self.exporter.get_finished_metrics().expect("metrics are exported");

        metrics
            .iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .filter(|metric| metric.name() == "larder.event.count")
            .flat_map(|metric| match metric.data() {
                AggregatedMetrics::U64(MetricData::Sum(sum)) => sum
                    .data_points()
                    .filter(|point| filter.iter().all(|wanted| point.attributes().any(|attr| attr == wanted)))
                    .map(opentelemetry_sdk::metrics::data::SumDataPoint::value)
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .max()
            .unwrap_or(0)
    }
}

fn get(path: &str) -> Request<()> {
    Request::get(path).body(()).expect("valid request")
}

#[tokio::test]
async fn events_are_counted_by_name_and_kind() {
    let tester = MetricTester::new();
    let cache = ResponseCacheBuilder::in_memory()
        .name("catalog")
        .metrics(&tester.provider)
        .build();

    for _ in 0..3 {
        cache
            .handle(get("/items"), |_| async {
                Ok::<_, Infallible>(Response::new(Bytes::from_static(b"items")))
            })
            .await
            .expect("infallible");
    }

    let name = KeyValue::new("cache.name", "catalog");
    assert_eq!(tester.count(&[name.clone(), KeyValue::new("cache.event", "miss")]), 1);
    assert_eq!(tester.count(&[name.clone(), KeyValue::new("cache.event", "stored")]), 1);
    assert_eq!(tester.count(&[name.clone(), KeyValue::new("cache.event", "hit")]), 2);
    assert_eq!(tester.count(&[name, KeyValue::new("cache.event", "finished")]), 3);
}
