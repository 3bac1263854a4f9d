use anyhow::Context;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    _provider: SdkMeterProvider,
    model_load_duration: Histogram<f64>,
    prediction_duration: Histogram<f64>,
    camera_attempts: Counter<u64>,
    predictions: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .context("failed to build prometheus exporter")?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let meter = provider.meter("age_gender_client");
        global::set_meter_provider(provider.clone());

        let model_load_duration = meter
            .f64_histogram("model_load_duration_ms")
            .with_boundaries(generate_boundaries((100, 1000, 5000, 30000)))
            .with_description("Duration of model downloads and session setup in milliseconds")
            .build();

        let prediction_duration = meter
            .f64_histogram("prediction_duration_ms")
            .with_boundaries(generate_boundaries((5, 50, 250, 1000)))
            .with_description("Duration of single-frame inference in milliseconds")
            .build();

        let camera_attempts = meter
            .u64_counter("camera_acquisition_attempts_total")
            .with_description("Camera stream acquisition attempts by outcome")
            .build();

        let predictions = meter
            .u64_counter("predictions_total")
            .with_description("Completed predictions by gender label")
            .build();

        Ok(Metrics {
            _provider: provider,
            model_load_duration,
            prediction_duration,
            camera_attempts,
            predictions,
            registry,
        })
    }

    pub fn record_model_load(&self, duration_ms: f64) {
        self.model_load_duration.record(duration_ms, &[]);
    }

    pub fn record_prediction(&self, duration_ms: f64, gender: &str) {
        let attributes = vec![KeyValue::new("gender", gender.to_string())];
        self.prediction_duration.record(duration_ms, &attributes);
        self.predictions.add(1, &attributes);
    }

    pub fn record_camera_attempt(&self, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.camera_attempts.add(1, &attributes);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = (parts.1 - parts.0).max(1) as usize / 9;
    let middle_step: usize = (parts.2 - parts.1).max(1) as usize / 4;
    let tail_step: usize = (parts.3 - parts.2).max(1) as usize / 5;
    let first_part = (parts.0..=parts.1).step_by(first_step.max(1));
    let middle_part = (parts.1..=parts.2).step_by(middle_step.max(1));
    let tail_part = (parts.2..=parts.3).step_by(tail_step.max(1));

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
