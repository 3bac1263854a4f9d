use crate::{dashboard::DashboardSnapshot, server::SharedState, session::SessionError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::instrument;

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match self {
            SessionError::AlreadyStarted => StatusCode::CONFLICT,
            SessionError::ModelSize(_) | SessionError::ModelLoad(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

#[instrument(skip(state))]
pub async fn start_session(
    State(state): State<SharedState>,
) -> Result<(StatusCode, Json<DashboardSnapshot>), SessionError> {
    state.session.begin()?;

    let session = state.session.clone();
    tokio::spawn(async move {
        if let Err(e) = session.run().await {
            tracing::error!("Session aborted: {}", e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(state.session.dashboard().snapshot()),
    ))
}
