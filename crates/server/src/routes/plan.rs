use axum::extract::State;
use axum::Json;
use pathfinder_core::{PlanRequest, PlanResponse};
use tracing::info;

use crate::error::{AppError, ErrorResponse};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/plan",
    request_body = PlanRequest,
    responses(
        (status = 200, description = "Ranked venues for the request", body = PlanResponse),
        (status = 400, description = "Request malformed", body = ErrorResponse)
    ),
    tag = "plan"
)]
pub async fn create_plan(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, AppError> {
    let response = state.service.plan(request).await?;
    info!(
        request_id = %response.execution.request_id,
        venues = response.venues.len(),
        attempts = response.execution.attempts,
        exhausted = response.execution.exhausted,
        "Plan served"
    );
    Ok(Json(response))
}
