mod health;
mod metrics;
mod predict;
mod start;
mod status;
mod video_feed;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/status", get(status::status))
        .route("/start", post(start::start_session))
        .route("/predict", post(predict::predict))
        .route("/video_feed", get(video_feed::video_feed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::CameraAcquirer,
        config::CameraConfig,
        dashboard::Dashboard,
        media::{MediaDevices, VideoSink},
        model_size::ModelSizeEstimator,
        session::{Session, SessionContext, SessionSettings},
        telemetry::Metrics,
        tensor::TensorArena,
        test_support::{model_server, FixedHeap, MockMediaDevices, MockRuntime, ServedModel},
    };
    use reqwest::{Client, StatusCode};
    use serde_json::Value;
    use std::{sync::Arc, time::Duration};
    use tokio::net::TcpListener;

    async fn serve_app(media: MockMediaDevices) -> String {
        let model_url = model_server(
            ServedModel::new()
                .with_manifest_len(1024)
                .with_shard("group1-shard1of1.bin", Some(1_048_576)),
        )
        .await;

        let metrics = Arc::new(Metrics::new().unwrap());
        let ctx = SessionContext {
            dashboard: Arc::new(Dashboard::new()),
            sink: Arc::new(VideoSink::new()),
            arena: TensorArena::new(),
            heap: Arc::new(FixedHeap(None)),
            metrics: metrics.clone(),
        };
        let camera = CameraAcquirer::new(
            Some(Arc::new(media) as Arc<dyn MediaDevices>),
            ctx.sink.clone(),
            ctx.dashboard.clone(),
            metrics.clone(),
            Duration::from_millis(10),
        );
        let session = Session::new(
            SessionSettings {
                model_base_url: model_url,
                max_camera_retries: 2,
            },
            ctx,
            ModelSizeEstimator::new(Client::new()),
            Arc::new(MockRuntime::new(35.0, 0.8)),
            camera,
        );
        let state = SharedState {
            session: Arc::new(session),
            camera_config: CameraConfig::default(),
            metrics,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = api_routes().with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{}", addr)
    }

    async fn json(response: reqwest::Response) -> Value {
        serde_json::from_str(&response.text().await.unwrap()).unwrap()
    }

    async fn wait_until_ready(client: &Client, app: &str) -> Value {
        for _ in 0..200 {
            let status = json(client.get(format!("{}/status", app)).send().await.unwrap()).await;
            if status["session_state"] == "Ready" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never became ready");
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let app = serve_app(MockMediaDevices::new()).await;

        let response = Client::new()
            .get(format!("{}/status", app))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let status = json(response).await;
        assert_eq!(status["session_state"], "Idle");
        assert_eq!(status["start_enabled"], true);
        assert_eq!(status["predict_visible"], false);
    }

    #[tokio::test]
    async fn test_start_accepts_once() {
        let app = serve_app(MockMediaDevices::new()).await;
        let client = Client::new();

        let first = client.post(format!("{}/start", app)).send().await.unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);
        assert_eq!(json(first).await["start_enabled"], false);

        let second = client.post(format!("{}/start", app)).send().await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let status = wait_until_ready(&client, &app).await;
        assert_eq!(status["predict_visible"], true);
        assert_eq!(status["status_message"], "Camera initialized successfully!");
    }

    #[tokio::test]
    async fn test_predict_is_rejected_before_start() {
        let app = serve_app(MockMediaDevices::new()).await;

        let response = Client::new()
            .post(format!("{}/predict", app))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_predict_after_ready() {
        let app = serve_app(MockMediaDevices::new()).await;
        let client = Client::new();

        client.post(format!("{}/start", app)).send().await.unwrap();
        wait_until_ready(&client, &app).await;

        let response = client.post(format!("{}/predict", app)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let prediction = json(response).await;
        assert_eq!(prediction["age"], 35.0);
        assert_eq!(prediction["gender"], "Female");

        let status = json(client.get(format!("{}/status", app)).send().await.unwrap()).await;
        assert_eq!(
            status["output"],
            "Predicted Age: 35.0\nPredicted Gender: Female"
        );
    }

    #[tokio::test]
    async fn test_predict_without_camera_is_unavailable() {
        let app = serve_app(MockMediaDevices::new().failing_first(usize::MAX)).await;
        let client = Client::new();

        client.post(format!("{}/start", app)).send().await.unwrap();
        let status = wait_until_ready(&client, &app).await;
        assert_eq!(status["alerts"].as_array().unwrap().len(), 1);

        let response = client.post(format!("{}/predict", app)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response
            .text()
            .await
            .unwrap()
            .contains("No active camera stream"));
    }
}
