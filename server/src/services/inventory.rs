//! Inventory ledger: remaining seats per tier and the oversell guard.
//!
//! Everything here is pure. Stores call [`deduct`] while holding whatever
//! lock or transaction makes "read remaining, decide, write sold" atomic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{LineItem, TicketTier};
use crate::utils::error::OrderError;

/// One requested line: how many seats of which tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub tier_id: Uuid,
    pub quantity: u32,
}

impl From<&LineItem> for TicketRequest {
    fn from(item: &LineItem) -> Self {
        Self {
            tier_id: item.tier_id,
            quantity: item.quantity,
        }
    }
}

/// Wire shape of an availability check.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityCheck {
    pub available: bool,
    pub reason: Option<String>,
}

impl From<Result<(), OrderError>> for AvailabilityCheck {
    fn from(result: Result<(), OrderError>) -> Self {
        match result {
            Ok(()) => Self {
                available: true,
                reason: None,
            },
            Err(e) => Self {
                available: false,
                reason: Some(e.to_string()),
            },
        }
    }
}

/// Merges repeated tiers and drops zero-quantity lines, keeping the order in
/// which tiers first appear.
pub fn normalize(lines: &[TicketRequest]) -> Vec<TicketRequest> {
    let mut merged: Vec<TicketRequest> = Vec::with_capacity(lines.len());
    for line in lines.iter().filter(|line| line.quantity > 0) {
        match merged.iter_mut().find(|m| m.tier_id == line.tier_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(*line),
        }
    }
    merged
}

fn find_tier<'a>(
    tiers: &'a [TicketTier],
    event_id: Uuid,
    tier_id: Uuid,
) -> Result<&'a TicketTier, OrderError> {
    tiers
        .iter()
        .find(|tier| tier.id == tier_id && tier.event_id == event_id)
        .ok_or(OrderError::UnknownTier(tier_id))
}

/// All-or-nothing check: every line must fit within its tier's remaining
/// seats and per-person cap. The first failing line is reported.
pub fn check_availability(
    tiers: &[TicketTier],
    event_id: Uuid,
    lines: &[TicketRequest],
) -> Result<(), OrderError> {
    let lines = normalize(lines);
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    for line in &lines {
        let tier = find_tier(tiers, event_id, line.tier_id)?;

        if let Some(max) = tier.max_per_person.and_then(|max| u32::try_from(max).ok()) {
            if max > 0 && line.quantity > max {
                return Err(OrderError::PerPersonLimit {
                    tier: tier.name.clone(),
                    max,
                });
            }
        }

        let remaining = tier.remaining();
        if line.quantity > remaining {
            return Err(OrderError::Unavailable {
                tier: tier.name.clone(),
                remaining,
            });
        }
    }

    Ok(())
}

/// Re-checks availability against `tiers` and, only if every line fits,
/// increments `sold` on each. On error no tier is modified.
pub fn deduct(
    tiers: &mut [TicketTier],
    event_id: Uuid,
    lines: &[TicketRequest],
    now: DateTime<Utc>,
) -> Result<(), OrderError> {
    check_availability(tiers, event_id, lines)?;

    for line in normalize(lines) {
        if let Some(tier) = tiers
            .iter_mut()
            .find(|tier| tier.id == line.tier_id && tier.event_id == event_id)
        {
            // check_availability bounds quantity by remaining, which fits in i32
            tier.sold += line.quantity as i32;
            tier.updated_at = now;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn tier(event_id: Uuid, name: &str, capacity: i32, sold: i32) -> TicketTier {
        TicketTier::new(event_id, name, Decimal::from(5000), capacity).with_sold(sold)
    }

    #[test]
    fn test_request_beyond_remaining_names_tier() {
        let event_id = Uuid::new_v4();
        let vip = tier(event_id, "VIP", 50, 45);
        let lines = [TicketRequest {
            tier_id: vip.id,
            quantity: 10,
        }];

        let check = AvailabilityCheck::from(check_availability(&[vip], event_id, &lines));
        assert!(!check.available);
        assert_eq!(check.reason.as_deref(), Some("Only 5 seats left for VIP"));
    }

    #[test]
    fn test_exact_remaining_is_available() {
        let event_id = Uuid::new_v4();
        let vip = tier(event_id, "VIP", 50, 45);
        let lines = [TicketRequest {
            tier_id: vip.id,
            quantity: 5,
        }];
        assert!(check_availability(&[vip], event_id, &lines).is_ok());
    }

    #[test]
    fn test_one_failing_line_fails_whole_request() {
        let event_id = Uuid::new_v4();
        let regular = tier(event_id, "Regular", 100, 0);
        let vip = tier(event_id, "VIP", 10, 10);
        let lines = [
            TicketRequest {
                tier_id: regular.id,
                quantity: 2,
            },
            TicketRequest {
                tier_id: vip.id,
                quantity: 1,
            },
        ];
        let mut tiers = vec![regular, vip];

        let err = deduct(&mut tiers, event_id, &lines, Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::Unavailable { remaining: 0, .. }));
        assert_eq!(tiers[0].sold, 0, "no partial deduction");
    }

    #[test]
    fn test_per_person_cap_enforced() {
        let event_id = Uuid::new_v4();
        let vip = tier(event_id, "VIP", 100, 0).with_max_per_person(4);
        let lines = [
            TicketRequest {
                tier_id: vip.id,
                quantity: 3,
            },
            TicketRequest {
                tier_id: vip.id,
                quantity: 2,
            },
        ];

        let err = check_availability(&[vip], event_id, &lines).unwrap_err();
        assert!(matches!(err, OrderError::PerPersonLimit { max: 4, .. }));
    }

    #[test]
    fn test_tier_from_other_event_is_unknown() {
        let vip = tier(Uuid::new_v4(), "VIP", 100, 0);
        let lines = [TicketRequest {
            tier_id: vip.id,
            quantity: 1,
        }];
        let err = check_availability(&[vip], Uuid::new_v4(), &lines).unwrap_err();
        assert!(matches!(err, OrderError::UnknownTier(_)));
    }

    #[test]
    fn test_empty_request_rejected() {
        let event_id = Uuid::new_v4();
        let vip = tier(event_id, "VIP", 100, 0);
        let lines = [TicketRequest {
            tier_id: vip.id,
            quantity: 0,
        }];
        assert!(matches!(
            check_availability(&[vip], event_id, &lines),
            Err(OrderError::EmptyOrder)
        ));
    }

    #[test]
    fn test_deduct_increments_sold() {
        let event_id = Uuid::new_v4();
        let mut tiers = vec![tier(event_id, "Regular", 10, 3)];
        let lines = [TicketRequest {
            tier_id: tiers[0].id,
            quantity: 2,
        }];

        deduct(&mut tiers, event_id, &lines, Utc::now()).unwrap();
        assert_eq!(tiers[0].sold, 5);
        assert_eq!(tiers[0].remaining(), 5);
    }

    #[test]
    fn test_normalize_merges_and_drops_zero() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = normalize(&[
            TicketRequest {
                tier_id: a,
                quantity: 1,
            },
            TicketRequest {
                tier_id: b,
                quantity: 0,
            },
            TicketRequest {
                tier_id: a,
                quantity: 2,
            },
        ]);
        assert_eq!(
            merged,
            vec![TicketRequest {
                tier_id: a,
                quantity: 3
            }]
        );
    }
}
