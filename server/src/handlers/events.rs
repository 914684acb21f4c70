use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::inventory::TicketRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub tickets: Vec<TicketRequest>,
}

/// GET /api/events/:event_id/availability
pub async fn get_availability(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let tiers = state.orders.availability(event_id).await?;
    if tiers.is_empty() {
        return Err(AppError::NotFound(format!(
            "No ticket tiers for event '{}'",
            event_id
        )));
    }
    Ok(success(tiers, "Availability retrieved"))
}

/// POST /api/events/:event_id/availability/check
///
/// A sold-out answer is a normal result (`available: false`), not an error.
pub async fn check_availability(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<AvailabilityRequest>,
) -> Result<Response, AppError> {
    let check = state
        .orders
        .check_availability(event_id, &body.tickets)
        .await?;
    Ok(success(check, "Availability checked"))
}
