use crate::{
    config::ModelConfig,
    runtime::{InferenceRuntime, LoadedModel, RuntimeError},
    tensor::{DType, Tensor, TensorArena},
};
use async_trait::async_trait;
use ndarray::ArrayD;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use reqwest::Client;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Loads ONNX exports served next to the model manifest.
#[derive(Debug, Clone)]
pub struct OrtRuntime {
    client: Client,
    onnx_file: String,
}

impl OrtRuntime {
    pub fn new(client: Client, model_config: &ModelConfig) -> Self {
        Self {
            client,
            onnx_file: model_config.onnx_file.clone(),
        }
    }
}

#[async_trait]
impl InferenceRuntime for OrtRuntime {
    #[instrument(skip(self))]
    async fn load_model(&self, base_url: &str) -> Result<Arc<dyn LoadedModel>, RuntimeError> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), self.onnx_file);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), url);

        let session = tokio::task::spawn_blocking(move || {
            Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_memory(&bytes)
        })
        .await??;

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();
        tracing::info!("Created ONNX session with outputs {:?}", output_names);

        Ok(Arc::new(OrtModel {
            session: Arc::new(Mutex::new(session)),
            output_names: Arc::new(output_names),
        }))
    }
}

struct OrtModel {
    session: Arc<Mutex<Session>>,
    output_names: Arc<Vec<String>>,
}

fn run_session(
    session: &Mutex<Session>,
    output_names: &[String],
    input: ArrayD<f32>,
) -> Result<Vec<ArrayD<f32>>, RuntimeError> {
    let mut session = session.lock().map_err(|_| RuntimeError::Poisoned)?;

    let tensor_ref = TensorRef::from_array_view(input.view())?;
    let outputs = session.run(ort::inputs![tensor_ref])?;

    let mut arrays = Vec::with_capacity(output_names.len());
    for name in output_names {
        let (shape, data) = outputs[name.as_str()].try_extract_tensor::<f32>()?;
        arrays.push(ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())?);
    }
    Ok(arrays)
}

#[async_trait]
impl LoadedModel for OrtModel {
    async fn predict(
        &self,
        arena: &TensorArena,
        input: &Tensor,
    ) -> Result<Vec<Tensor>, RuntimeError> {
        let session = self.session.clone();
        let output_names = self.output_names.clone();
        let input = input.data().as_standard_layout().into_owned();

        let arrays =
            tokio::task::spawn_blocking(move || run_session(&session, &output_names, input))
                .await??;

        Ok(arrays
            .into_iter()
            .map(|array| arena.track(array, DType::Float32))
            .collect())
    }
}
