use crate::{dashboard::DashboardSnapshot, server::SharedState};
use axum::{extract::State, Json};

pub async fn status(State(state): State<SharedState>) -> Json<DashboardSnapshot> {
    Json(state.session.dashboard().snapshot())
}
