use reqwest::{header::CONTENT_LENGTH, header::HeaderMap, Client};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
pub const MANIFEST_FILE: &str = "model.json";

#[derive(Error, Debug)]
pub enum ModelSizeError {
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to parse model manifest: {0}")]
    InvalidManifest(#[from] serde_json::Error),
    #[error("Model manifest declares no weight groups")]
    EmptyWeightsManifest,
}

#[derive(Debug, Deserialize)]
struct ModelManifest {
    #[serde(rename = "weightsManifest")]
    weights_manifest: Vec<WeightsGroup>,
}

#[derive(Debug, Deserialize)]
struct WeightsGroup {
    paths: Vec<String>,
}

/// Total download footprint of a served model: the manifest itself plus
/// every shard of its first weight group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSize {
    pub total_bytes: u64,
    pub shard_count: usize,
}

impl ModelSize {
    pub fn megabytes(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MB
    }
}

/// A missing or malformed `content-length` counts as zero bytes.
pub fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct ModelSizeEstimator {
    client: Client,
}

impl ModelSizeEstimator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn estimate_size_mb(&self, base_url: &str) -> Result<f64, ModelSizeError> {
        Ok(self.estimate(base_url).await?.megabytes())
    }

    #[instrument(skip(self))]
    pub async fn estimate(&self, base_url: &str) -> Result<ModelSize, ModelSizeError> {
        let base_url = base_url.trim_end_matches('/');
        let manifest_url = format!("{}/{}", base_url, MANIFEST_FILE);

        let response = self
            .client
            .get(&manifest_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| ModelSizeError::Fetch {
                url: manifest_url.clone(),
                source,
            })?;

        let mut total_bytes = content_length(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|source| ModelSizeError::Fetch {
                url: manifest_url.clone(),
                source,
            })?;

        let manifest: ModelManifest = serde_json::from_slice(&body)?;
        let shards = manifest
            .weights_manifest
            .into_iter()
            .next()
            .ok_or(ModelSizeError::EmptyWeightsManifest)?
            .paths;

        for shard in &shards {
            let shard_url = format!("{}/{}", base_url, shard);
            let response = self
                .client
                .head(&shard_url)
                .send()
                .await
                .map_err(|source| ModelSizeError::Fetch {
                    url: shard_url.clone(),
                    source,
                })?;

            if !response.status().is_success() {
                tracing::warn!(
                    "Weight shard {} answered with status {}",
                    shard_url,
                    response.status()
                );
            }

            let shard_bytes = content_length(response.headers());
            tracing::debug!("Weight shard {} is {} bytes", shard, shard_bytes);
            total_bytes += shard_bytes;
        }

        Ok(ModelSize {
            total_bytes,
            shard_count: shards.len(),
        })
    }
}
