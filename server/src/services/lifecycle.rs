//! Order state machine.
//!
//! These functions decide and apply a transition on records the caller has
//! already locked. They never touch storage themselves, so the memory and
//! Postgres stores run exactly the same rules inside their critical sections.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{Order, OrderStatus, PromoCode, TicketTier};
use crate::services::inventory::{self, TicketRequest};
use crate::services::promo::PromoRejection;
use crate::utils::error::OrderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Inventory was deducted and the order is now confirmed.
    Applied,
    /// The order was confirmed earlier; nothing changed.
    AlreadyConfirmed,
}

/// Extra data stamped on an order by a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionStamp {
    pub transaction_id: Option<String>,
    pub actor: Option<String>,
}

/// Confirms a pending order: deducts every line from `tiers`, counts one use
/// of the applied promo code and flips the status. Either all of that happens
/// or none of it does.
///
/// `promo` must be the record for `order.promo_code` if one was applied; a
/// code deleted since the order was placed is skipped.
pub fn apply_confirmation(
    order: &mut Order,
    tiers: &mut [TicketTier],
    promo: Option<&mut PromoCode>,
    transaction_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<Confirmation, OrderError> {
    match order.status {
        OrderStatus::Pending => {}
        OrderStatus::Confirmed => return Ok(Confirmation::AlreadyConfirmed),
        from => {
            return Err(OrderError::IllegalTransition {
                from,
                to: OrderStatus::Confirmed,
            })
        }
    }

    if order.promo_code.is_some() {
        match promo.as_deref() {
            Some(code) if !code.has_uses_left() => {
                return Err(OrderError::InvalidPromo(PromoRejection::UsageLimitReached));
            }
            Some(_) => {}
            None => warn!(
                order_id = %order.id,
                code = ?order.promo_code,
                "Applied promo code no longer exists; usage not counted"
            ),
        }
    }

    let lines: Vec<TicketRequest> = order.tickets.iter().map(TicketRequest::from).collect();
    let mut staged = tiers.to_vec();
    inventory::deduct(&mut staged, order.event_id, &lines, now)?;
    tiers.clone_from_slice(&staged);

    if let Some(code) = promo {
        code.used_count += 1;
    }

    order.status = OrderStatus::Confirmed;
    order.confirmed_at = Some(now);
    if transaction_id.is_some() {
        order.transaction_id = transaction_id;
    }

    Ok(Confirmation::Applied)
}

/// Moves an order to `cancelled` or `used`. Confirmation has its own entry
/// point because it consumes inventory.
pub fn apply_transition(
    order: &mut Order,
    to: OrderStatus,
    stamp: TransitionStamp,
    now: DateTime<Utc>,
) -> Result<(), OrderError> {
    let from = order.status;
    if to == OrderStatus::Confirmed || !from.can_transition_to(to) {
        return Err(OrderError::IllegalTransition { from, to });
    }

    order.status = to;
    match to {
        OrderStatus::Cancelled => order.cancelled_at = Some(now),
        OrderStatus::Used => {
            order.used_at = Some(now);
            order.admitted_by = stamp.actor;
        }
        OrderStatus::Pending | OrderStatus::Confirmed => {}
    }
    if stamp.transaction_id.is_some() {
        order.transaction_id = stamp.transaction_id;
    }

    Ok(())
}
