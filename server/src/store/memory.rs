use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::TicketStore;
use crate::models::{normalize_code, Order, OrderStatus, PromoCode, TicketTier};
use crate::services::lifecycle::{self, Confirmation, TransitionStamp};
use crate::utils::error::{OrderError, StoreError};

#[derive(Default)]
struct Tables {
    tiers: HashMap<Uuid, TicketTier>,
    promo_codes: HashMap<String, PromoCode>,
    orders: HashMap<Uuid, Order>,
    references: HashMap<String, Uuid>,
}

/// Single-process store. Writers take the table lock for the full
/// read-decide-write sequence, so confirmations and admissions serialize.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn upsert_tier(&self, mut tier: TicketTier) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        // Admin edits never move `sold`; only confirmation does.
        if let Some(existing) = tables.tiers.get(&tier.id) {
            tier.sold = existing.sold;
            tier.created_at = existing.created_at;
        }
        if tier.sold < 0 || tier.sold > tier.available {
            return Err(StoreError::Corrupt(format!(
                "tier {} has sold {} of {}",
                tier.id, tier.sold, tier.available
            )));
        }
        tables.tiers.insert(tier.id, tier);
        Ok(())
    }

    async fn event_tiers(&self, event_id: Uuid) -> Result<Vec<TicketTier>, StoreError> {
        let tables = self.tables.read().await;
        let mut tiers: Vec<TicketTier> = tables
            .tiers
            .values()
            .filter(|tier| tier.event_id == event_id)
            .cloned()
            .collect();
        tiers.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        Ok(tiers)
    }

    async fn upsert_promo_code(&self, mut promo: PromoCode) -> Result<(), StoreError> {
        promo.code = normalize_code(&promo.code);
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.promo_codes.get(&promo.code) {
            promo.used_count = existing.used_count;
        }
        tables.promo_codes.insert(promo.code.clone(), promo);
        Ok(())
    }

    async fn promo_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        Ok(self.tables.read().await.promo_codes.get(code).cloned())
    }

    async fn increment_promo_usage(&self, code: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.promo_codes.get_mut(code) {
            Some(promo) if promo.has_uses_left() => {
                promo.used_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.references.contains_key(&order.tx_ref) {
            return Err(StoreError::DuplicateReference(order.tx_ref));
        }
        tables.references.insert(order.tx_ref.clone(), order.id);
        tables.orders.insert(order.id, order);
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn order_by_reference(&self, tx_ref: &str) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .references
            .get(tx_ref)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| status.map_or(true, |s| order.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.orders.remove(&id) {
            Some(order) => {
                tables.references.remove(&order.tx_ref);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn confirm_order(
        &self,
        id: Uuid,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<(Order, Confirmation)>, OrderError> {
        let mut tables = self.tables.write().await;
        let Some(mut order) = tables.orders.get(&id).cloned() else {
            return Ok(None);
        };

        let mut tiers: Vec<TicketTier> = tables
            .tiers
            .values()
            .filter(|tier| tier.event_id == order.event_id)
            .cloned()
            .collect();
        let mut promo = order
            .promo_code
            .as_deref()
            .and_then(|code| tables.promo_codes.get(code))
            .cloned();

        let outcome =
            lifecycle::apply_confirmation(&mut order, &mut tiers, promo.as_mut(), transaction_id, now)?;

        if outcome == Confirmation::Applied {
            for tier in tiers {
                tables.tiers.insert(tier.id, tier);
            }
            if let Some(promo) = promo {
                tables.promo_codes.insert(promo.code.clone(), promo);
            }
            tables.orders.insert(order.id, order.clone());
        }

        Ok(Some((order, outcome)))
    }

    async fn transition_order(
        &self,
        id: Uuid,
        to: OrderStatus,
        stamp: TransitionStamp,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, OrderError> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(None);
        };

        lifecycle::apply_transition(order, to, stamp, now)?;
        Ok(Some(order.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuyerContact, DiscountType, LineItem, PaymentMethod};
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn order_for(tier: &TicketTier, quantity: u32) -> Order {
        let subtotal = tier.price * Decimal::from(quantity);
        Order {
            id: Uuid::new_v4(),
            tx_ref: format!("SOP-{}", Uuid::new_v4().simple()),
            event_id: tier.event_id,
            tickets: vec![LineItem {
                tier_id: tier.id,
                tier_name: tier.name.clone(),
                quantity,
                unit_price: tier.price,
            }],
            subtotal,
            service_fee: Decimal::ZERO,
            discount: Decimal::ZERO,
            promo_code: None,
            total: subtotal,
            buyer: BuyerContact {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: "0800".to_string(),
            },
            payment_method: PaymentMethod::Card,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            confirmed_at: None,
            transaction_id: None,
            cancelled_at: None,
            used_at: None,
            admitted_by: None,
        }
    }

    fn capped_promo(max_uses: i32) -> PromoCode {
        let now = Utc::now();
        PromoCode {
            code: "door10".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: Decimal::from(1000),
            min_purchase: Decimal::ZERO,
            max_uses,
            used_count: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            event_id: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_admin_edit_keeps_sold_count() {
        let store = MemoryStore::new();
        let tier = TicketTier::new(Uuid::new_v4(), "VIP", Decimal::from(9000), 4);
        store.upsert_tier(tier.clone()).await.unwrap();

        let first = order_for(&tier, 4);
        store.insert_order(first.clone()).await.unwrap();
        store.confirm_order(first.id, None, Utc::now()).await.unwrap();

        let mut edited = tier.clone();
        edited.price = Decimal::from(9500);
        store.upsert_tier(edited).await.unwrap();

        let tiers = store.event_tiers(tier.event_id).await.unwrap();
        assert_eq!(tiers[0].sold, 4);
        assert_eq!(tiers[0].price, Decimal::from(9500));
        assert_eq!(tiers[0].created_at, tier.created_at);

        let second = order_for(&tier, 4);
        store.insert_order(second.clone()).await.unwrap();
        assert!(matches!(
            store.confirm_order(second.id, None, Utc::now()).await,
            Err(OrderError::Unavailable { remaining: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_admin_edit_cannot_drop_capacity_below_sold() {
        let store = MemoryStore::new();
        let tier = TicketTier::new(Uuid::new_v4(), "VIP", Decimal::from(9000), 4).with_sold(3);
        store.upsert_tier(tier.clone()).await.unwrap();

        let mut edited = tier;
        edited.available = 2;
        edited.sold = 0;
        assert!(matches!(
            store.upsert_tier(edited).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_edit_keeps_promo_usage() {
        let store = MemoryStore::new();
        store.upsert_promo_code(capped_promo(0)).await.unwrap();
        assert!(store.increment_promo_usage("DOOR10").await.unwrap());
        assert!(store.increment_promo_usage("DOOR10").await.unwrap());

        let mut edited = capped_promo(5);
        edited.discount_value = Decimal::from(1500);
        store.upsert_promo_code(edited).await.unwrap();

        let promo = store.promo_code("DOOR10").await.unwrap().unwrap();
        assert_eq!(promo.used_count, 2);
        assert_eq!(promo.max_uses, 5);
        assert_eq!(promo.discount_value, Decimal::from(1500));
    }

    #[tokio::test]
    async fn test_promo_usage_stops_at_cap() {
        let store = MemoryStore::new();
        store.upsert_promo_code(capped_promo(2)).await.unwrap();

        assert!(store.increment_promo_usage("DOOR10").await.unwrap());
        assert!(store.increment_promo_usage("DOOR10").await.unwrap());
        assert!(!store.increment_promo_usage("DOOR10").await.unwrap());
        assert!(!store.increment_promo_usage("NOPE").await.unwrap());

        let promo = store.promo_code("DOOR10").await.unwrap().unwrap();
        assert_eq!(promo.used_count, 2);
    }

    #[tokio::test]
    async fn test_upsert_rejects_oversold_tier() {
        let store = MemoryStore::new();
        let tier = TicketTier::new(Uuid::new_v4(), "VIP", Decimal::from(100), 5).with_sold(6);
        assert!(matches!(
            store.upsert_tier(tier).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_event_tiers_filters_by_event() {
        let store = MemoryStore::new();
        let event_id = Uuid::new_v4();
        store
            .upsert_tier(TicketTier::new(event_id, "VIP", Decimal::from(9000), 10))
            .await
            .unwrap();
        store
            .upsert_tier(TicketTier::new(event_id, "Regular", Decimal::from(5000), 10))
            .await
            .unwrap();
        store
            .upsert_tier(TicketTier::new(Uuid::new_v4(), "Other", Decimal::from(1), 10))
            .await
            .unwrap();

        let tiers = store.event_tiers(event_id).await.unwrap();
        let names: Vec<&str> = tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Regular", "VIP"]);
    }
}
