//! Metrics backed by the OpenTelemetry global meter provider.
//!
//! Without an installed meter provider the global meter is a no-op, so the
//! sink is safe to use in every configuration.

use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::{global, KeyValue};
use pipeline::{FailureTags, MetricsSink};

/// Name of the counter incremented once per failed request.
pub const WORKFLOW_ERRORS: &str = "workflow_errors";

/// Name of the gauge holding the cold-start duration in milliseconds.
pub const INITIALIZATION: &str = "initialization";

#[derive(Clone)]
pub struct OtelMetricsSink {
    errors: Counter<u64>,
    initialization: Gauge<f64>,
}

impl OtelMetricsSink {
    /// Creates the instruments on the global meter named `scope`.
    pub fn new(scope: &'static str) -> Self {
        Self::from_meter(&global::meter(scope))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        let errors = meter
            .u64_counter(WORKFLOW_ERRORS)
            .with_description("Workflow runs that ended in an error")
            .build();
        let initialization = meter
            .f64_gauge(INITIALIZATION)
            .with_description("Time from process start until the server accepts requests")
            .with_unit("ms")
            .build();
        Self {
            errors,
            initialization,
        }
    }

    /// Records the cold-start duration once the server is listening.
    pub fn record_initialization(&self, elapsed_ms: f64, env: &str) {
        self.initialization
            .record(elapsed_ms, &[KeyValue::new("env", env.to_owned())]);
    }
}

impl MetricsSink for OtelMetricsSink {
    fn record_failure(&self, tags: &FailureTags) {
        self.errors.add(
            1,
            &[
                KeyValue::new("env", tags.env.clone()),
                KeyValue::new("workflow_name", tags.workflow_name.clone()),
                KeyValue::new("workflow_version", tags.workflow_version.clone()),
                KeyValue::new("error_kind", tags.kind.as_str()),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::runtime;
    use opentelemetry_sdk::testing::metrics::InMemoryMetricExporter;
    use pipeline::ErrorKind;

    fn failure() -> FailureTags {
        FailureTags {
            env: "test".into(),
            workflow_name: "users".into(),
            workflow_version: "1.0.0".into(),
            kind: ErrorKind::Domain,
        }
    }

    #[test]
    fn recording_without_a_provider_is_a_no_op() {
        let sink = OtelMetricsSink::new("listener-test");
        sink.record_failure(&failure());
        sink.record_initialization(12.5, "test");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn failures_and_cold_start_reach_the_exporter() {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone(), runtime::Tokio).build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();

        let sink = OtelMetricsSink::from_meter(&provider.meter("listener-test"));
        sink.record_failure(&failure());
        sink.record_initialization(12.5, "test");
        provider.force_flush().unwrap();

        let exported = exporter.get_finished_metrics().unwrap();
        let names: Vec<String> = exported
            .iter()
            .flat_map(|resource| &resource.scope_metrics)
            .flat_map(|scope| &scope.metrics)
            .map(|metric| metric.name.to_string())
            .collect();
        assert!(names.iter().any(|n| n == WORKFLOW_ERRORS), "{names:?}");
        assert!(names.iter().any(|n| n == INITIALIZATION), "{names:?}");
    }
}
