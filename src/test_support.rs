use crate::{
    media::{
        MediaConstraints, MediaDevices, MediaError, MediaErrorKind, MediaStream, MediaTrack,
        PermissionState,
    },
    memory::{HeapIntrospection, HeapUsage},
    runtime::{InferenceRuntime, LoadedModel, RuntimeError},
    tensor::{DType, Tensor, TensorArena},
};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header::CONTENT_LENGTH, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, head},
    Router,
};
use bytes::Bytes;
use image::{Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::net::TcpListener;

enum ManifestBody {
    Natural,
    Padded(usize),
    Chunked,
    Raw(String),
    Missing,
}

pub struct ServedModel {
    manifest: ManifestBody,
    shards: Vec<(String, Option<u64>)>,
}

impl ServedModel {
    pub fn new() -> Self {
        Self {
            manifest: ManifestBody::Natural,
            shards: Vec::new(),
        }
    }

    pub fn with_shard(mut self, name: &str, content_length: Option<u64>) -> Self {
        self.shards.push((name.to_string(), content_length));
        self
    }

    pub fn with_manifest_len(mut self, len: usize) -> Self {
        self.manifest = ManifestBody::Padded(len);
        self
    }

    pub fn chunked_manifest(mut self) -> Self {
        self.manifest = ManifestBody::Chunked;
        self
    }

    pub fn with_raw_manifest(mut self, body: &str) -> Self {
        self.manifest = ManifestBody::Raw(body.to_string());
        self
    }

    pub fn without_manifest(mut self) -> Self {
        self.manifest = ManifestBody::Missing;
        self
    }

    fn manifest_json(&self) -> String {
        let paths: Vec<&str> = self.shards.iter().map(|(name, _)| name.as_str()).collect();
        serde_json::json!({
            "format": "graph-model",
            "weightsManifest": [{ "paths": paths, "weights": [] }],
        })
        .to_string()
    }
}

async fn shard_head(
    Path(name): Path<String>,
    State(shards): State<Arc<HashMap<String, Option<u64>>>>,
) -> Response {
    match shards.get(&name) {
        Some(Some(len)) => Response::builder()
            .header(CONTENT_LENGTH, *len)
            .body(Body::empty())
            .unwrap(),
        Some(None) => StatusCode::OK.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serves `model` under `/tfjs_model` on an ephemeral port and returns its
/// base URL.
pub async fn model_server(model: ServedModel) -> String {
    let json = model.manifest_json();
    let shards: HashMap<String, Option<u64>> = model.shards.iter().cloned().collect();

    let mut router = Router::new().route("/tfjs_model/{shard}", head(shard_head));
    router = match model.manifest {
        ManifestBody::Natural => {
            router.route("/tfjs_model/model.json", get(move || async move { json }))
        }
        ManifestBody::Padded(len) => {
            assert!(json.len() <= len, "manifest is longer than {} bytes", len);
            let padded = format!("{:<width$}", json, width = len);
            router.route("/tfjs_model/model.json", get(move || async move { padded }))
        }
        ManifestBody::Chunked => router.route(
            "/tfjs_model/model.json",
            get(move || async move {
                let chunks = vec![Ok::<_, Infallible>(Bytes::from(json))];
                Body::from_stream(futures::stream::iter(chunks))
            }),
        ),
        ManifestBody::Raw(body) => {
            router.route("/tfjs_model/model.json", get(move || async move { body }))
        }
        ManifestBody::Missing => router,
    };
    let router = router.with_state(Arc::new(shards));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}/tfjs_model", addr)
}

pub struct MockTrack {
    live: AtomicBool,
}

impl MockTrack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            live: AtomicBool::new(true),
        })
    }
}

impl MediaTrack for MockTrack {
    fn label(&self) -> String {
        "mock camera".to_string()
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn grab_frame(&self) -> Result<RgbImage, MediaError> {
        if !self.is_live() {
            return Err(MediaError::new(MediaErrorKind::Aborted, "track stopped"));
        }
        Ok(RgbImage::from_pixel(320, 240, Rgb([128, 64, 32])))
    }
}

pub struct MockMediaDevices {
    supported: bool,
    permission: Result<PermissionState, MediaError>,
    failures: usize,
    attempts: AtomicUsize,
    watched: Option<Arc<MockTrack>>,
    watched_liveness: Mutex<Vec<bool>>,
}

impl MockMediaDevices {
    pub fn new() -> Self {
        Self {
            supported: true,
            permission: Ok(PermissionState::Granted),
            failures: 0,
            attempts: AtomicUsize::new(0),
            watched: None,
            watched_liveness: Mutex::new(Vec::new()),
        }
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    pub fn with_permission(mut self, permission: Result<PermissionState, MediaError>) -> Self {
        self.permission = permission;
        self
    }

    /// Fails the first `failures` acquisition attempts.
    pub fn failing_first(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    /// Records whether `track` is still live at each acquisition attempt.
    pub fn watching(mut self, track: Arc<MockTrack>) -> Self {
        self.watched = Some(track);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn watched_liveness(&self) -> Vec<bool> {
        self.watched_liveness.lock().clone()
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    fn supports_user_media(&self) -> bool {
        self.supported
    }

    async fn query_camera_permission(&self) -> Result<PermissionState, MediaError> {
        self.permission.clone()
    }

    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        assert_eq!(constraints, MediaConstraints::video_only());

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(track) = &self.watched {
            self.watched_liveness.lock().push(track.is_live());
        }

        if attempt <= self.failures {
            return Err(MediaError::new(
                MediaErrorKind::NotReadable,
                "Could not start video source",
            ));
        }
        Ok(MediaStream::new(vec![MockTrack::new()]))
    }
}

#[derive(Clone)]
pub struct MockModel {
    age: f32,
    gender_probability: f32,
    extra_output: bool,
    fail: bool,
}

impl MockModel {
    pub fn new(age: f32, gender_probability: f32) -> Self {
        Self {
            age,
            gender_probability,
            extra_output: false,
            fail: false,
        }
    }

    pub fn with_extra_output(mut self) -> Self {
        self.extra_output = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

fn scalar(arena: &TensorArena, value: f32) -> Tensor {
    arena.track(
        ArrayD::from_shape_vec(IxDyn(&[1, 1]), vec![value]).unwrap(),
        DType::Float32,
    )
}

#[async_trait]
impl LoadedModel for MockModel {
    async fn predict(
        &self,
        arena: &TensorArena,
        input: &Tensor,
    ) -> Result<Vec<Tensor>, RuntimeError> {
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        if self.fail {
            return Err(RuntimeError::Model("inference backend crashed".into()));
        }

        let mut outputs = vec![
            scalar(arena, self.age),
            scalar(arena, self.gender_probability),
        ];
        if self.extra_output {
            outputs.push(scalar(arena, 0.0));
        }
        Ok(outputs)
    }
}

pub struct MockRuntime {
    model: MockModel,
    fail: bool,
    loads: AtomicUsize,
}

impl MockRuntime {
    pub fn new(age: f32, gender_probability: f32) -> Self {
        Self {
            model: MockModel::new(age, gender_probability),
            fail: false,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceRuntime for MockRuntime {
    async fn load_model(&self, _base_url: &str) -> Result<Arc<dyn LoadedModel>, RuntimeError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RuntimeError::Model("model.onnx not found".into()));
        }
        Ok(Arc::new(self.model.clone()))
    }
}

pub struct FixedHeap(pub Option<HeapUsage>);

impl HeapIntrospection for FixedHeap {
    fn heap_usage(&self) -> Option<HeapUsage> {
        self.0
    }
}
