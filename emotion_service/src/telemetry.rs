use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to build Prometheus exporter: {0}")]
    Exporter(String),
}

pub struct Metrics {
    request_counter: Counter<u64>,
    inference_duration: Histogram<u64>,
    faces_detected: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("emotion_service");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        // Image inference takes tens of milliseconds, audio includes the
        // recording window of several seconds.
        let inference_duration = meter
            .u64_histogram("inference_duration_ms")
            .with_boundaries(duration_boundaries(&[(10, 100, 10), (100, 1000, 100), (1000, 10_000, 500)]))
            .with_description("Duration of inference requests in milliseconds")
            .build();

        let faces_detected = meter
            .u64_counter("faces_detected_total")
            .with_description("Faces classified by the visual endpoint")
            .build();

        Ok(Metrics {
            request_counter,
            inference_duration,
            faces_detected,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_inference_duration(&self, duration_ms: u64, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.inference_duration.record(duration_ms, &attributes);
    }

    pub fn record_faces(&self, count: usize) {
        self.faces_detected.add(count as u64, &[]);
    }
}

/// Histogram bucket edges from `(start, end, step)` segments, deduplicated
/// where segments meet.
fn duration_boundaries(segments: &[(u64, u64, usize)]) -> Vec<f64> {
    let mut boundaries: Vec<u64> = Vec::new();
    for &(start, end, step) in segments {
        for edge in (start..=end).step_by(step.max(1)) {
            if boundaries.last() != Some(&edge) {
                boundaries.push(edge);
            }
        }
    }
    boundaries.into_iter().map(|edge| edge as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_boundaries() {
        let get = duration_boundaries(&[(10, 30, 10), (30, 50, 20), (50, 150, 100)]);
        let expected = vec![10.0, 20.0, 30.0, 50.0, 150.0];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_metrics_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("visual_emotion");
        metrics.record_inference_duration(42, "visual_emotion");
        metrics.record_faces(2);

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("requests_total")));
        assert!(names.iter().any(|n| n.starts_with("faces_detected_total")));
    }
}
