use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct ValidatePromoRequest {
    pub code: String,
    pub subtotal: Decimal,
    #[serde(default)]
    pub event_id: Option<Uuid>,
}

#[derive(Serialize)]
struct MarkUsedPayload {
    code: String,
    marked: bool,
}

/// POST /api/promo-codes/validate
///
/// Rejections come back as `valid: false` with the reason in `message`.
pub async fn validate_promo_code(
    State(state): State<AppState>,
    Json(body): Json<ValidatePromoRequest>,
) -> Result<Response, AppError> {
    if body.subtotal.is_sign_negative() {
        return Err(AppError::ValidationError(
            "Subtotal must not be negative".to_string(),
        ));
    }
    let validation = state
        .promos
        .validate_promo_code(&body.code, body.subtotal, body.event_id)
        .await?;
    Ok(success(validation, "Promo code checked"))
}

/// POST /api/promo-codes/:code/use
pub async fn mark_promo_code_used(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let marked = state.promos.mark_promo_code_used(&code).await?;
    Ok(success(MarkUsedPayload { code, marked }, "Promo code usage recorded"))
}
