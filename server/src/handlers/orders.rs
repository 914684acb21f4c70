use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::OrderStatus;
use crate::services::CreateOrderRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentCallback {
    pub tx_ref: String,
    pub transaction_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

fn order_not_found(id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(format!("Order '{}' was not found", id))
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Response, AppError> {
    let order = state.orders.create_order(request).await?;
    Ok(created(order, "Order created"))
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> Result<Response, AppError> {
    let orders = state.orders.orders(filter.status).await?;
    Ok(success(orders, "Orders retrieved"))
}

/// GET /api/orders/stats
pub async fn order_stats(State(state): State<AppState>) -> Result<Response, AppError> {
    let stats = state.orders.order_stats().await?;
    Ok(success(stats, "Order statistics retrieved"))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let order = state
        .orders
        .order(id)
        .await?
        .ok_or_else(|| order_not_found(id))?;
    Ok(success(order, "Order retrieved"))
}

/// DELETE /api/orders/:id
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    if !state.orders.delete_order(id).await? {
        return Err(order_not_found(id));
    }
    Ok(success(id, "Order deleted"))
}

/// POST /api/orders/:id/confirm
pub async fn confirm_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ConfirmRequest>>,
) -> Result<Response, AppError> {
    let Json(body) = body.unwrap_or_default();
    let order = state
        .orders
        .confirm_order(id, body.transaction_id)
        .await?
        .ok_or_else(|| order_not_found(id))?;
    Ok(success(order, "Order confirmed"))
}

/// POST /api/orders/:id/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Response, AppError> {
    let order = state
        .orders
        .update_order_status(id, body.status, body.transaction_id)
        .await?
        .ok_or_else(|| order_not_found(id))?;
    Ok(success(order, format!("Order is now {}", body.status)))
}

/// POST /api/payments/callback
pub async fn payment_callback(
    State(state): State<AppState>,
    Json(callback): Json<PaymentCallback>,
) -> Result<Response, AppError> {
    let order = state
        .orders
        .confirm_order_by_reference(&callback.tx_ref, Some(callback.transaction_id))
        .await?
        .ok_or_else(|| order_not_found(&callback.tx_ref))?;
    Ok(success(order, "Payment recorded"))
}
