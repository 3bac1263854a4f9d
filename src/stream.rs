use crate::media::{MediaError, MediaTrack, VideoSink};
use bytes::Bytes;
use futures::stream;
use image::ImageFormat;
use std::{io::Cursor, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

pub const FRAME_BOUNDARY: &str = "frame";

#[derive(Clone)]
pub struct VideoStream {
    pub sink: Arc<VideoSink>,
    pub video_stream_delay: u64,
}

#[derive(Error, Debug)]
pub enum VideoStreamError {
    #[error("Camera error: {0}")]
    Camera(#[from] MediaError),
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Frame task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Http builder error: {0}")]
    HttpBuilderError(String),
}

async fn encode_frame(track: Arc<dyn MediaTrack>) -> Result<Vec<u8>, VideoStreamError> {
    tokio::task::spawn_blocking(move || {
        let frame = track.grab_frame()?;
        let mut buf = Cursor::new(Vec::new());
        frame.write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok(buf.into_inner())
    })
    .await?
}

impl VideoStream {
    pub fn new(sink: Arc<VideoSink>, video_stream_delay: u64) -> Self {
        Self {
            sink,
            video_stream_delay,
        }
    }

    /// Multipart JPEG parts of the attached stream. Ends once no live stream
    /// is attached.
    #[instrument(skip(self))]
    pub fn generate_stream(self) -> impl futures::Stream<Item = Result<Bytes, VideoStreamError>> {
        let delay = Duration::from_millis(self.video_stream_delay);

        stream::unfold(self.sink, move |sink| async move {
            sleep(delay).await;
            let track = sink.video_track()?;
            match encode_frame(track).await {
                Ok(frame) => {
                    let part_header = format!(
                        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                        FRAME_BOUNDARY,
                        frame.len()
                    );
                    let mut body = part_header.into_bytes();
                    body.extend_from_slice(&frame);
                    body.extend_from_slice(b"\r\n");
                    Some((Ok(Bytes::from(body)), sink))
                }
                Err(e) => {
                    tracing::error!("Error getting frame: {:?}", e);
                    Some((Err(e), sink))
                }
            }
        })
    }
}
