use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::OrderStatus;
use crate::services::promo::PromoRejection;
use crate::utils::response::error as error_response;

/// Failure of the underlying record store. Never swallowed: callers either
/// propagate it or surface it as a 503.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error")]
    Database(#[source] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Payment reference '{0}' is already in use")]
    DuplicateReference(String),
}

/// Recoverable outcomes of order operations, rendered to the buyer or door
/// staff as-is.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Only {remaining} seats left for {tier}")]
    Unavailable { tier: String, remaining: u32 },

    #[error("Ticket tier {0} does not exist for this event")]
    UnknownTier(uuid::Uuid),

    #[error("Maximum {max} tickets per person for {tier}")]
    PerPersonLimit { tier: String, max: u32 },

    #[error("No tickets selected")]
    EmptyOrder,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidPromo(PromoRejection),

    #[error("Cannot move order from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => {
                StoreError::Unavailable("timed out waiting for a connection".to_string())
            }
            sqlx::Error::PoolClosed => StoreError::Unavailable("pool is closed".to_string()),
            other => StoreError::Database(other),
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        OrderError::Storage(StoreError::from(e))
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Sold out: {0}")]
    SoldOut(String),

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Storage error")]
    Storage(#[from] StoreError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SoldOut(_) => StatusCode::CONFLICT,
            AppError::IllegalTransition { .. } => StatusCode::CONFLICT,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::SoldOut(_) => "SOLD_OUT",
            AppError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            AppError::Storage(_) => "STORAGE_UNAVAILABLE",
        }
    }

    fn log(&self) {
        match self {
            AppError::Storage(e) => {
                error!(error = ?e, "Storage error");
            }
            _ => {
                warn!(code = self.code(), message = %self, "Request rejected");
            }
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Unavailable { .. } => AppError::SoldOut(e.to_string()),
            OrderError::IllegalTransition { from, to } => AppError::IllegalTransition { from, to },
            OrderError::Storage(inner) => AppError::Storage(inner),
            OrderError::UnknownTier(_)
            | OrderError::PerPersonLimit { .. }
            | OrderError::EmptyOrder
            | OrderError::InvalidRequest(_)
            | OrderError::InvalidPromo(_) => AppError::ValidationError(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        let (public_message, details) = match &self {
            AppError::ValidationError(msg) | AppError::NotFound(msg) | AppError::SoldOut(msg) => {
                (msg.clone(), None)
            }
            AppError::IllegalTransition { from, to } => (
                self.to_string(),
                Some(json!({ "from": from, "to": to })),
            ),
            AppError::Storage(StoreError::DuplicateReference(reference)) => (
                format!("Payment reference '{}' is already in use", reference),
                None,
            ),
            // Internal details stay in the logs
            AppError::Storage(_) => ("The record store is unavailable".to_string(), None),
        };

        error_response(code, public_message, details, status)
    }
}
