use axum::{Json, extract::State};

use vehiclink_types::api::HealthResponse;

use crate::auth::AppState;
use crate::error::{ApiResult, blocking};

pub async fn root() -> &'static str {
    "Backend is running successfully"
}

/// GET /health: 200 once the database answers a trivial query.
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    blocking(move || Ok(state.db.ping()?)).await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}
