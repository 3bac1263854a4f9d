use crate::{
    server::SharedState,
    stream::{VideoStream, VideoStreamError, FRAME_BOUNDARY},
};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn video_feed(State(state): State<SharedState>) -> Result<Response, VideoStreamError> {
    if !state.session.sink().has_stream() {
        return Ok((StatusCode::SERVICE_UNAVAILABLE, "No active camera stream").into_response());
    }

    let stream = VideoStream::new(
        state.session.sink().clone(),
        state.camera_config.get_stream_delay_ms(),
    )
    .generate_stream();

    let body = Body::from_stream(stream);

    let response = Response::builder()
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", FRAME_BOUNDARY),
        )
        .body(body)
        .map_err(|e| VideoStreamError::HttpBuilderError(e.to_string()))?;

    Ok(response)
}

impl IntoResponse for VideoStreamError {
    fn into_response(self) -> Response {
        let status = match self {
            VideoStreamError::Camera(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
