use crate::media::{
    MediaConstraints, MediaDevices, MediaError, MediaErrorKind, MediaStream, MediaTrack,
    PermissionState,
};
use async_trait::async_trait;
use image::RgbImage;
use opencv::{core::Mat, imgproc, prelude::*, videoio};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

impl From<opencv::Error> for MediaError {
    fn from(err: opencv::Error) -> Self {
        MediaError::new(MediaErrorKind::NotReadable, err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct OpenCvMediaDevices {
    device_index: i32,
}

impl OpenCvMediaDevices {
    pub fn new(device_index: i32) -> Self {
        Self { device_index }
    }
}

#[async_trait]
impl MediaDevices for OpenCvMediaDevices {
    #[cfg(target_os = "linux")]
    async fn query_camera_permission(&self) -> Result<PermissionState, MediaError> {
        let path = format!("/dev/video{}", self.device_index);
        match std::fs::File::open(&path) {
            Ok(_) => Ok(PermissionState::Granted),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Ok(PermissionState::Denied)
            }
            Err(e) => Err(MediaError::new(
                MediaErrorKind::NotFound,
                format!("{}: {}", path, e),
            )),
        }
    }

    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        if !constraints.video || constraints.audio {
            return Err(MediaError::new(
                MediaErrorKind::NotSupported,
                "only video capture is available",
            ));
        }

        let device_index = self.device_index;
        let capture = tokio::task::spawn_blocking(move || {
            videoio::VideoCapture::new(device_index, videoio::CAP_ANY)
        })
        .await
        .map_err(|e| MediaError::new(MediaErrorKind::Aborted, e.to_string()))??;

        if !capture.is_opened()? {
            return Err(MediaError::new(
                MediaErrorKind::NotFound,
                format!("no camera available at index {}", device_index),
            ));
        }

        let track = OpenCvTrack {
            label: format!("camera {}", device_index),
            capture: Mutex::new(capture),
            live: AtomicBool::new(true),
        };
        Ok(MediaStream::new(vec![Arc::new(track)]))
    }
}

struct OpenCvTrack {
    label: String,
    capture: Mutex<videoio::VideoCapture>,
    live: AtomicBool,
}

impl MediaTrack for OpenCvTrack {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.capture.lock().release() {
                tracing::warn!("Failed to release {}: {:?}", self.label, e);
            }
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn grab_frame(&self) -> Result<RgbImage, MediaError> {
        if !self.is_live() {
            return Err(MediaError::new(
                MediaErrorKind::Aborted,
                "track has been stopped",
            ));
        }

        let mut frame = Mat::default();
        let read = self.capture.lock().read(&mut frame)?;
        if !read || frame.empty() {
            return Err(MediaError::new(
                MediaErrorKind::NotReadable,
                "camera returned an empty frame",
            ));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        let rgb = if rgb.is_continuous() {
            rgb
        } else {
            rgb.try_clone()?
        };

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        RgbImage::from_raw(width, height, rgb.data_bytes()?.to_vec()).ok_or_else(|| {
            MediaError::new(
                MediaErrorKind::NotReadable,
                format!("frame buffer does not match {}x{}", width, height),
            )
        })
    }
}
