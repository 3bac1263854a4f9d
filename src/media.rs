//! Host device-media abstractions: capability and permission queries,
//! stream acquisition, and the display sink a stream is attached to.

use async_trait::async_trait;
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Prompt => "prompt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl MediaConstraints {
    pub fn video_only() -> Self {
        Self {
            video: true,
            audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorKind {
    NotSupported,
    NotAllowed,
    NotFound,
    NotReadable,
    Aborted,
    Unknown,
}

impl MediaErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaErrorKind::NotSupported => "NotSupportedError",
            MediaErrorKind::NotAllowed => "NotAllowedError",
            MediaErrorKind::NotFound => "NotFoundError",
            MediaErrorKind::NotReadable => "NotReadableError",
            MediaErrorKind::Aborted => "AbortError",
            MediaErrorKind::Unknown => "UnknownError",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} - {message}", kind.as_str())]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub message: String,
}

impl MediaError {
    pub fn new(kind: MediaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub trait MediaTrack: Send + Sync {
    fn label(&self) -> String;
    fn stop(&self);
    fn is_live(&self) -> bool;
    /// Blocks until the next frame is available.
    fn grab_frame(&self) -> Result<RgbImage, MediaError>;
}

pub struct MediaStream {
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    fn supports_user_media(&self) -> bool {
        true
    }

    async fn query_camera_permission(&self) -> Result<PermissionState, MediaError> {
        Err(MediaError::new(
            MediaErrorKind::NotSupported,
            "camera permission query is not available on this host",
        ))
    }

    async fn get_user_media(&self, constraints: MediaConstraints)
        -> Result<MediaStream, MediaError>;
}

/// Live-preview element. Holds at most one stream at a time and doubles as
/// the pixel source for frame capture.
#[derive(Default)]
pub struct VideoSink {
    src: Mutex<Option<MediaStream>>,
}

impl VideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_stream(&self) -> bool {
        self.src.lock().is_some()
    }

    /// Attaches `stream`, stopping whatever was attached before.
    pub fn attach(&self, stream: MediaStream) {
        let previous = self.src.lock().replace(stream);
        if let Some(previous) = previous {
            previous.stop_all();
        }
    }

    /// Stops every track of the attached stream and detaches it. Returns the
    /// number of tracks stopped.
    pub fn stop_and_detach(&self) -> usize {
        match self.src.lock().take() {
            Some(stream) => {
                stream.stop_all();
                stream.tracks().len()
            }
            None => 0,
        }
    }

    pub fn video_track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.src
            .lock()
            .as_ref()
            .and_then(|stream| stream.tracks().iter().find(|t| t.is_live()).cloned())
    }
}

/// Device-media capability of this host, if any backend was compiled in.
pub fn host_media_devices(
    config: &crate::config::CameraConfig,
) -> Option<Arc<dyn MediaDevices>> {
    #[cfg(feature = "opencv")]
    {
        Some(Arc::new(crate::opencv_media::OpenCvMediaDevices::new(
            config.device_index,
        )))
    }
    #[cfg(not(feature = "opencv"))]
    {
        let _ = config;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTrack;

    #[test]
    fn test_media_error_display() {
        let err = MediaError::new(MediaErrorKind::NotAllowed, "Permission denied");
        assert_eq!(err.to_string(), "NotAllowedError - Permission denied");
    }

    #[test]
    fn test_attach_replaces_and_stops_previous() {
        let sink = VideoSink::new();
        let first = MockTrack::new();
        let second = MockTrack::new();

        sink.attach(MediaStream::new(vec![first.clone()]));
        sink.attach(MediaStream::new(vec![second.clone()]));

        assert!(!first.is_live());
        assert!(second.is_live());
        assert!(sink.has_stream());
    }

    #[test]
    fn test_stop_and_detach() {
        let sink = VideoSink::new();
        assert_eq!(sink.stop_and_detach(), 0);

        let track = MockTrack::new();
        sink.attach(MediaStream::new(vec![track.clone()]));
        assert!(sink.video_track().is_some());

        assert_eq!(sink.stop_and_detach(), 1);
        assert!(!track.is_live());
        assert!(!sink.has_stream());
        assert!(sink.video_track().is_none());
    }
}
