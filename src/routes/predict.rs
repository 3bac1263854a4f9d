use crate::{
    prediction::{PredictError, Prediction},
    server::SharedState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::instrument;

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match self {
            PredictError::NotReady => StatusCode::CONFLICT,
            PredictError::NoActiveStream
            | PredictError::Capture(_)
            | PredictError::EmptyFrame(..) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Something went wrong: {}", self)).into_response()
    }
}

#[instrument(skip(state))]
pub async fn predict(State(state): State<SharedState>) -> Result<Json<Prediction>, PredictError> {
    let prediction = state.session.predict().await?;
    tracing::debug!(
        "Predicted age {:.1}, gender {} ({:.3}) in {:.2} ms",
        prediction.age,
        prediction.gender.as_str(),
        prediction.gender_probability,
        prediction.inference_ms
    );
    Ok(Json(prediction))
}
