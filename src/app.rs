use crate::{
    camera::CameraAcquirer,
    config::Config,
    dashboard::Dashboard,
    media::{host_media_devices, VideoSink},
    memory::ProcessMemory,
    model_size::ModelSizeEstimator,
    ort_runtime::OrtRuntime,
    server::{HttpServer, SharedState},
    session::{Session, SessionContext, SessionSettings},
    telemetry::Metrics,
    tensor::TensorArena,
};

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let metrics = Arc::new(Metrics::new()?);
    let client = reqwest::Client::builder().build()?;

    let ctx = SessionContext {
        dashboard: Arc::new(Dashboard::new()),
        sink: Arc::new(VideoSink::new()),
        arena: TensorArena::new(),
        heap: Arc::new(ProcessMemory),
        metrics: metrics.clone(),
    };

    let media = host_media_devices(&config.camera);
    if media.is_none() {
        tracing::warn!("No camera backend compiled in; camera access will be reported as unsupported");
    }
    let camera = CameraAcquirer::new(
        media,
        ctx.sink.clone(),
        ctx.dashboard.clone(),
        metrics.clone(),
        config.camera.get_retry_delay(),
    );

    let session = Arc::new(Session::new(
        SessionSettings {
            model_base_url: config.model.get_base_url().to_string(),
            max_camera_retries: config.camera.max_retries,
        },
        ctx,
        ModelSizeEstimator::new(client.clone()),
        Arc::new(OrtRuntime::new(client, &config.model)),
        camera,
    ));

    let state = SharedState {
        session: session.clone(),
        camera_config: config.camera.clone(),
        metrics,
    };
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    let stopped = session.sink().stop_and_detach();
    tracing::info!("Camera released ({} tracks stopped)", stopped);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
