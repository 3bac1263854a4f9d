use crate::{
    camera::CameraAcquirer,
    dashboard::{Alert, Dashboard},
    media::VideoSink,
    memory::HeapIntrospection,
    model_size::{ModelSizeError, ModelSizeEstimator},
    prediction::{PredictError, Prediction, Predictor},
    runtime::{InferenceRuntime, LoadedModel, RuntimeError},
    telemetry::Metrics,
    tensor::TensorArena,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    EstimatingSize,
    LoadingModel,
    AcquiringCamera,
    Ready,
    Failed,
}

impl SessionState {
    /// Sessions only move one phase forward, or to `Failed` while a phase is
    /// still running. `Ready` and `Failed` are terminal.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, EstimatingSize)
                | (EstimatingSize, LoadingModel)
                | (LoadingModel, AcquiringCamera)
                | (AcquiringCamera, Ready)
                | (EstimatingSize | LoadingModel | AcquiringCamera, Failed)
        )
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A session has already been started")]
    AlreadyStarted,
    #[error("Model metadata load failed: {0}")]
    ModelSize(#[from] ModelSizeError),
    #[error("Model loading failed: {0}")]
    ModelLoad(#[from] RuntimeError),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model_base_url: String,
    pub max_camera_retries: u32,
}

/// The long-lived pieces a session reports to and reads from.
#[derive(Clone)]
pub struct SessionContext {
    pub dashboard: Arc<Dashboard>,
    pub sink: Arc<VideoSink>,
    pub arena: TensorArena,
    pub heap: Arc<dyn HeapIntrospection>,
    pub metrics: Arc<Metrics>,
}

pub struct Session {
    settings: SessionSettings,
    ctx: SessionContext,
    estimator: ModelSizeEstimator,
    runtime: Arc<dyn InferenceRuntime>,
    camera: CameraAcquirer,
    model: RwLock<Option<Arc<dyn LoadedModel>>>,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(
        settings: SessionSettings,
        ctx: SessionContext,
        estimator: ModelSizeEstimator,
        runtime: Arc<dyn InferenceRuntime>,
        camera: CameraAcquirer,
    ) -> Self {
        Self {
            settings,
            ctx,
            estimator,
            runtime,
            camera,
            model: RwLock::new(None),
            state: RwLock::new(SessionState::Idle),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn dashboard(&self) -> &Arc<Dashboard> {
        &self.ctx.dashboard
    }

    pub fn sink(&self) -> &Arc<VideoSink> {
        &self.ctx.sink
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.write();
        if state.can_transition_to(next) {
            tracing::debug!("Session state {:?} -> {:?}", *state, next);
            *state = next;
            self.ctx.dashboard.set_session_state(next);
        } else {
            tracing::warn!("Ignoring session transition {:?} -> {:?}", *state, next);
        }
    }

    /// Presses the start control: disables it and hides predict. Fails when
    /// the control was already used.
    pub fn begin(&self) -> Result<(), SessionError> {
        if !self.ctx.dashboard.disable_start() {
            return Err(SessionError::AlreadyStarted);
        }
        self.ctx.dashboard.set_predict_visible(false);
        Ok(())
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.begin()?;
        self.run().await
    }

    /// Runs size estimation, model load and camera acquisition in order.
    /// Any phase failure is reported and alerted, and ends the session.
    /// Runs only once per session; later calls fail with `AlreadyStarted`.
    #[instrument(skip(self), fields(model = %self.settings.model_base_url))]
    pub(crate) async fn run(&self) -> Result<(), SessionError> {
        let dashboard = &self.ctx.dashboard;
        let base_url = self.settings.model_base_url.as_str();

        {
            let mut state = self.state.write();
            if *state != SessionState::Idle {
                return Err(SessionError::AlreadyStarted);
            }
            *state = SessionState::EstimatingSize;
        }
        dashboard.set_session_state(SessionState::EstimatingSize);
        dashboard.report("Downloading model metadata...", 10);
        match self.estimator.estimate_size_mb(base_url).await {
            Ok(size_mb) => dashboard.set_storage(format!("Model Size: {:.2} MB", size_mb)),
            Err(e) => {
                tracing::error!("Error fetching model size: {:?}", e);
                dashboard.report(
                    "Failed to fetch model size. Check model path or server setup.",
                    100,
                );
                dashboard.alert(Alert::new("Model metadata load failed", e.to_string()));
                self.transition(SessionState::Failed);
                return Err(e.into());
            }
        }

        self.transition(SessionState::LoadingModel);
        dashboard.report("Loading model into memory...", 40);
        let load_started = Instant::now();
        match self.runtime.load_model(base_url).await {
            Ok(model) => {
                let load_ms = load_started.elapsed().as_secs_f64() * 1000.0;
                dashboard.set_elapsed(format!("Model Download Time: {:.2} ms", load_ms));
                self.ctx.metrics.record_model_load(load_ms);
                *self.model.write() = Some(model);
                dashboard.report("Model loaded successfully!", 60);
            }
            Err(e) => {
                tracing::error!("Error loading model: {:?}", e);
                dashboard.report(
                    "Failed to load model. Ensure model files exist and are accessible.",
                    100,
                );
                dashboard.alert(Alert::new("Model loading failed", e.to_string()));
                self.transition(SessionState::Failed);
                return Err(e.into());
            }
        }

        self.transition(SessionState::AcquiringCamera);
        dashboard.report("Initializing camera...", 70);
        let outcome = self
            .camera
            .acquire(self.settings.max_camera_retries)
            .await;
        if !outcome.is_ready() {
            tracing::warn!("Camera acquisition ended with {:?}", outcome);
        }
        dashboard.report("Camera initialized successfully!", 100);
        dashboard.set_predict_visible(true);
        self.transition(SessionState::Ready);

        Ok(())
    }

    /// Presses the predict control.
    pub async fn predict(&self) -> Result<Prediction, PredictError> {
        if !self.ctx.dashboard.predict_visible() {
            return Err(PredictError::NotReady);
        }
        let model = self.model.read().clone().ok_or(PredictError::NotReady)?;

        Predictor::new(
            model,
            self.ctx.sink.clone(),
            self.ctx.arena.clone(),
            self.ctx.dashboard.clone(),
            self.ctx.heap.clone(),
            self.ctx.metrics.clone(),
        )
        .predict()
        .await
    }
}
