use axum::Json;
use axum::extract::State;

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        failed_audit_writes: state.audit_writer.failed_writes(),
    })
}
