use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A priced class of seats for one event (Regular, VIP, ...).
///
/// `available` is the tier's total capacity; `sold` only ever moves when an
/// order is confirmed. `0 <= sold <= available` holds at all times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub available: i32,
    pub sold: i32,
    pub max_per_person: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketTier {
    pub fn new(event_id: Uuid, name: impl Into<String>, price: Decimal, available: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            name: name.into(),
            price,
            available,
            sold: 0,
            max_per_person: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sold(mut self, sold: i32) -> Self {
        self.sold = sold;
        self
    }

    pub fn with_max_per_person(mut self, max: i32) -> Self {
        self.max_per_person = Some(max);
        self
    }

    /// Seats still open for sale. Never negative, even for a tier whose
    /// capacity was lowered below its sold count by admin tooling.
    pub fn remaining(&self) -> u32 {
        u32::try_from(self.available.saturating_sub(self.sold)).unwrap_or(0)
    }
}

/// Public view of a tier's stock.
#[derive(Debug, Clone, Serialize)]
pub struct TierAvailability {
    pub tier_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub capacity: i32,
    pub sold: i32,
    pub remaining: u32,
    pub max_per_person: Option<i32>,
}

impl From<&TicketTier> for TierAvailability {
    fn from(tier: &TicketTier) -> Self {
        Self {
            tier_id: tier.id,
            name: tier.name.clone(),
            price: tier.price,
            capacity: tier.available,
            sold: tier.sold,
            remaining: tier.remaining(),
            max_per_person: tier.max_per_person,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_is_capacity_minus_sold() {
        let tier = TicketTier::new(Uuid::new_v4(), "VIP", Decimal::from(5000), 50).with_sold(45);
        assert_eq!(tier.remaining(), 5);
    }

    #[test]
    fn test_remaining_never_negative() {
        let tier = TicketTier::new(Uuid::new_v4(), "VIP", Decimal::from(5000), 10).with_sold(12);
        assert_eq!(tier.remaining(), 0);
    }
}
