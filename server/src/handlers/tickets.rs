use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Raw scanner output or a typed reference.
    pub payload: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdmitRequest {
    #[serde(default)]
    pub staff: Option<String>,
}

/// POST /api/tickets/verify
///
/// Every classification, including `invalid` and `used`, is a 200 so the
/// scanner can render it.
pub async fn verify_ticket(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Response, AppError> {
    let verification = state.redemption.verify_ticket(&body.payload).await?;
    let message = verification.message.clone();
    Ok(success(verification, message))
}

/// POST /api/tickets/:order_id/admit
pub async fn admit_ticket(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    body: Option<Json<AdmitRequest>>,
) -> Result<Response, AppError> {
    let Json(body) = body.unwrap_or_default();
    let verification = state.redemption.admit(order_id, body.staff).await?;
    let message = verification.message.clone();
    Ok(success(verification, message))
}
