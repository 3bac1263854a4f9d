use crate::{
    dashboard::{Alert, Dashboard},
    media::{MediaConstraints, MediaDevices, MediaError, PermissionState, VideoSink},
    telemetry::Metrics,
};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::instrument;

pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// How an acquisition ended. Failures have already been reported and
/// alerted by the time the caller sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready { attempts: u32 },
    Unsupported,
    PermissionDenied,
    Failed { attempts: u32, error: MediaError },
}

impl AcquireOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, AcquireOutcome::Ready { .. })
    }
}

pub struct CameraAcquirer {
    media: Option<Arc<dyn MediaDevices>>,
    sink: Arc<VideoSink>,
    dashboard: Arc<Dashboard>,
    metrics: Arc<Metrics>,
    retry_delay: Duration,
}

impl CameraAcquirer {
    pub fn new(
        media: Option<Arc<dyn MediaDevices>>,
        sink: Arc<VideoSink>,
        dashboard: Arc<Dashboard>,
        metrics: Arc<Metrics>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            media,
            sink,
            dashboard,
            metrics,
            retry_delay,
        }
    }

    /// Attaches a camera stream to the sink, making one attempt plus
    /// `max_retries` retries spaced by a fixed delay.
    #[instrument(skip(self))]
    pub async fn acquire(&self, max_retries: u32) -> AcquireOutcome {
        self.dashboard.report("Requesting camera access...", 90);

        let media = match self.media.as_ref().filter(|m| m.supports_user_media()) {
            Some(media) => media,
            None => {
                self.dashboard.alert(Alert::new(
                    "Camera unsupported",
                    "Camera access is not supported on this host.",
                ));
                self.dashboard.report("Camera not supported.", 100);
                return AcquireOutcome::Unsupported;
            }
        };

        match media.query_camera_permission().await {
            Ok(PermissionState::Denied) => {
                tracing::info!("Camera permission state: denied");
                self.dashboard.alert(Alert::new(
                    "Camera permission denied",
                    "Camera access has been permanently denied. Please allow it in your system settings.",
                ));
                self.dashboard.report("Camera permission denied.", 100);
                return AcquireOutcome::PermissionDenied;
            }
            Ok(state) => tracing::info!("Camera permission state: {}", state.as_str()),
            Err(e) => tracing::warn!("Permission query not supported or failed: {}", e),
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!("Camera access attempt {}...", attempt);

            let stopped = self.sink.stop_and_detach();
            if stopped > 0 {
                tracing::debug!("Stopped {} tracks of the previous stream", stopped);
            }

            match media.get_user_media(MediaConstraints::video_only()).await {
                Ok(stream) => {
                    for track in stream.tracks() {
                        tracing::debug!("Attaching track {}", track.label());
                    }
                    self.sink.attach(stream);
                    self.metrics.record_camera_attempt("granted");
                    self.dashboard.report("Camera ready!", 100);
                    tracing::info!("Camera access granted and stream started.");
                    return AcquireOutcome::Ready { attempts: attempt };
                }
                Err(error) => {
                    self.metrics.record_camera_attempt("failed");
                    tracing::warn!("Attempt {} failed: {}", attempt, error);

                    if attempt > max_retries {
                        self.dashboard.report(
                            "Failed to access camera. Please allow permission and refresh.",
                            100,
                        );
                        self.dashboard.alert(Alert::new(
                            error.kind.as_str(),
                            format!("Camera access failed: {}", error),
                        ));
                        return AcquireOutcome::Failed {
                            attempts: attempt,
                            error,
                        };
                    }

                    sleep(self.retry_delay).await;
                }
            }
        }
    }
}
