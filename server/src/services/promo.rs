//! Promo code validation and pricing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{normalize_code, DiscountType, PromoCode};
use crate::store::TicketStore;
use crate::utils::error::StoreError;

/// Why a code was refused. Checks run in declaration order and the first
/// failure wins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoRejection {
    #[error("Invalid promo code")]
    NotFound,

    #[error("This promo code is no longer active")]
    Inactive,

    #[error("This promo code is not yet valid")]
    NotYetValid,

    #[error("This promo code has expired")]
    Expired,

    #[error("This promo code has reached its usage limit")]
    UsageLimitReached,

    #[error("Minimum purchase of {minimum} required")]
    MinimumPurchase { minimum: Decimal },

    #[error("This promo code is not valid for this event")]
    WrongEvent,
}

/// A priced, accepted code.
#[derive(Debug, Clone, PartialEq)]
pub struct PromoQuote {
    pub code: String,
    pub discount: Decimal,
    pub message: String,
}

/// Wire shape of a validation result.
#[derive(Debug, Clone, Serialize)]
pub struct PromoValidation {
    pub valid: bool,
    pub discount: Decimal,
    pub message: String,
}

impl From<Result<PromoQuote, PromoRejection>> for PromoValidation {
    fn from(result: Result<PromoQuote, PromoRejection>) -> Self {
        match result {
            Ok(quote) => Self {
                valid: true,
                discount: quote.discount,
                message: quote.message,
            },
            Err(rejection) => Self {
                valid: false,
                discount: Decimal::ZERO,
                message: rejection.to_string(),
            },
        }
    }
}

/// Percentage codes round half away from zero to whole units; fixed codes
/// never discount more than the subtotal.
pub fn compute_discount(promo: &PromoCode, subtotal: Decimal) -> Decimal {
    match promo.discount_type {
        DiscountType::Percentage => (subtotal * promo.discount_value / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        DiscountType::Fixed => promo.discount_value.min(subtotal),
    }
}

fn success_message(promo: &PromoCode, discount: Decimal) -> String {
    match promo.discount_type {
        DiscountType::Percentage => format!("{}% off applied!", promo.discount_value.normalize()),
        DiscountType::Fixed => format!("{} off applied!", discount.normalize()),
    }
}

/// Pure validation of a looked-up code. `promo` is `None` when the code does
/// not exist.
pub fn validate(
    promo: Option<&PromoCode>,
    subtotal: Decimal,
    event_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<PromoQuote, PromoRejection> {
    let promo = promo.ok_or(PromoRejection::NotFound)?;

    if !promo.is_active {
        return Err(PromoRejection::Inactive);
    }
    if now < promo.valid_from {
        return Err(PromoRejection::NotYetValid);
    }
    if now > promo.valid_until {
        return Err(PromoRejection::Expired);
    }
    if !promo.has_uses_left() {
        return Err(PromoRejection::UsageLimitReached);
    }
    if subtotal < promo.min_purchase {
        return Err(PromoRejection::MinimumPurchase {
            minimum: promo.min_purchase.normalize(),
        });
    }
    if let Some(scoped) = promo.event_id {
        if event_id != Some(scoped) {
            return Err(PromoRejection::WrongEvent);
        }
    }

    let discount = compute_discount(promo, subtotal);
    Ok(PromoQuote {
        code: promo.code.clone(),
        discount,
        message: success_message(promo, discount),
    })
}

#[derive(Clone)]
pub struct PromoService {
    store: Arc<dyn TicketStore>,
}

impl PromoService {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Looks the code up and validates it. Mutates nothing.
    pub async fn quote(
        &self,
        code: &str,
        subtotal: Decimal,
        event_id: Option<Uuid>,
    ) -> Result<Result<PromoQuote, PromoRejection>, StoreError> {
        let promo = self.store.promo_code(&normalize_code(code)).await?;
        let result = validate(promo.as_ref(), subtotal, event_id, Utc::now());
        if let Err(rejection) = &result {
            debug!(code = %code, reason = %rejection, "Promo code rejected");
        }
        Ok(result)
    }

    pub async fn validate_promo_code(
        &self,
        code: &str,
        subtotal: Decimal,
        event_id: Option<Uuid>,
    ) -> Result<PromoValidation, StoreError> {
        Ok(self.quote(code, subtotal, event_id).await?.into())
    }

    /// Counts one use of the code outside order confirmation. Returns false
    /// when the code is unknown or already at its cap.
    pub async fn mark_promo_code_used(&self, code: &str) -> Result<bool, StoreError> {
        let code = normalize_code(code);
        let marked = self.store.increment_promo_usage(&code).await?;
        info!(code = %code, marked, "Promo code usage recorded");
        Ok(marked)
    }
}
