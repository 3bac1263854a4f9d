use crate::{
    dashboard::Dashboard,
    media::{MediaError, VideoSink},
    memory::{format_memory_usage, HeapIntrospection},
    runtime::{LoadedModel, RuntimeError},
    telemetry::Metrics,
    tensor::{Tensor, TensorArena},
};
use image::RgbImage;
use serde::Serialize;
use std::{fmt, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::instrument;

pub const INPUT_SIZE: usize = 224;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Predictions are not available until the session is ready")]
    NotReady,
    #[error("No active camera stream")]
    NoActiveStream,
    #[error("Frame capture failed: {0}")]
    Capture(#[from] MediaError),
    #[error("Frame capture task failed: {0}")]
    CaptureTask(#[from] tokio::task::JoinError),
    #[error("Inference failed: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("Expected 2 output tensors, got {0}")]
    UnexpectedOutputs(usize),
    #[error("Output tensor `{0}` is empty")]
    EmptyOutput(&'static str),
    #[error("Captured frame is empty ({0}x{1})")]
    EmptyFrame(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Strictly above one half is "Female"; everything else, the boundary
    /// included, is "Male".
    pub fn from_probability(probability: f32) -> Self {
        if probability > 0.5 {
            Gender::Female
        } else {
            Gender::Male
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Prediction {
    pub age: f32,
    pub gender: Gender,
    pub gender_probability: f32,
    pub inference_ms: f64,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Predicted Age: {:.1}\nPredicted Gender: {}",
            self.age,
            self.gender.as_str()
        )
    }
}

/// Turns one RGB frame into a `[1, 224, 224, 3]` float tensor in `[0, 1]`.
pub fn preprocess(arena: &TensorArena, frame: &RgbImage) -> Result<Tensor, PredictError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(PredictError::EmptyFrame(width, height));
    }

    Ok(arena.tidy(|| {
        Tensor::from_pixels(arena, frame)
            .resize_nearest_neighbor([INPUT_SIZE, INPUT_SIZE])
            .to_float()
            .div(255.0)
            .expand_dims(0)
    }))
}

pub struct Predictor {
    model: Arc<dyn LoadedModel>,
    sink: Arc<VideoSink>,
    arena: TensorArena,
    dashboard: Arc<Dashboard>,
    heap: Arc<dyn HeapIntrospection>,
    metrics: Arc<Metrics>,
}

impl Predictor {
    pub fn new(
        model: Arc<dyn LoadedModel>,
        sink: Arc<VideoSink>,
        arena: TensorArena,
        dashboard: Arc<Dashboard>,
        heap: Arc<dyn HeapIntrospection>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            model,
            sink,
            arena,
            dashboard,
            heap,
            metrics,
        }
    }

    #[instrument(skip(self))]
    pub async fn predict(&self) -> Result<Prediction, PredictError> {
        let track = self.sink.video_track().ok_or(PredictError::NoActiveStream)?;
        let frame = tokio::task::spawn_blocking(move || track.grab_frame()).await??;

        let input = preprocess(&self.arena, &frame)?;

        let started = Instant::now();
        let outputs = self.model.predict(&self.arena, &input).await?;
        let [age_tensor, gender_tensor]: [Tensor; 2] = outputs
            .try_into()
            .map_err(|outputs: Vec<Tensor>| PredictError::UnexpectedOutputs(outputs.len()))?;

        let age = age_tensor
            .first_scalar()
            .ok_or(PredictError::EmptyOutput("age"))?;
        let gender_probability = gender_tensor
            .first_scalar()
            .ok_or(PredictError::EmptyOutput("gender"))?;
        let inference_ms = started.elapsed().as_secs_f64() * 1000.0;

        let prediction = Prediction {
            age,
            gender: Gender::from_probability(gender_probability),
            gender_probability,
            inference_ms,
        };
        self.dashboard.set_output(prediction.to_string());

        input.dispose();
        age_tensor.dispose();
        gender_tensor.dispose();

        self.metrics
            .record_prediction(inference_ms, prediction.gender.as_str());
        self.update_performance_stats(inference_ms);

        Ok(prediction)
    }

    fn update_performance_stats(&self, inference_ms: f64) {
        self.dashboard
            .set_elapsed(format!("Inference Time: {:.2} ms", inference_ms));
        self.dashboard
            .set_memory(format_memory_usage(self.heap.heap_usage()));
    }
}
