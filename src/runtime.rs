use crate::tensor::{Tensor, TensorArena};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to download model: {0}")]
    Download(#[from] reqwest::Error),
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Invalid tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Session mutex poisoned")]
    Poisoned,
    #[error("Model error: {0}")]
    Model(String),
}

/// A model handle returned by [`InferenceRuntime::load_model`]. Read-only
/// once loaded; shared between predictions.
#[async_trait]
pub trait LoadedModel: Send + Sync {
    /// Runs the model on `input`; outputs come back in the model's declared
    /// order, each tracked by `arena`.
    async fn predict(
        &self,
        arena: &TensorArena,
        input: &Tensor,
    ) -> Result<Vec<Tensor>, RuntimeError>;
}

#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    async fn load_model(&self, base_url: &str) -> Result<Arc<dyn LoadedModel>, RuntimeError>;
}
