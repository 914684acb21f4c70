//! Order lifecycle manager: creation, confirmation and status changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    BuyerContact, LineItem, Order, OrderStatus, PaymentMethod, TierAvailability,
};
use crate::services::inventory::{self, AvailabilityCheck, TicketRequest};
use crate::services::lifecycle::{Confirmation, TransitionStamp};
use crate::services::promo::PromoService;
use crate::store::TicketStore;
use crate::utils::error::{OrderError, StoreError};

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub event_id: Uuid,
    pub tickets: Vec<TicketRequest>,
    pub buyer: BuyerContact,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Caller-chosen payment reference; generated when absent.
    #[serde(default)]
    pub tx_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub service_fee: Decimal,
    pub tx_ref_prefix: String,
}

/// Published after every successful create, confirm or transition so other
/// parts of the application can refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderNotification {
    pub order_id: Uuid,
    pub tx_ref: String,
    pub event_id: Uuid,
    pub status: OrderStatus,
}

impl From<&Order> for OrderNotification {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            tx_ref: order.tx_ref.clone(),
            event_id: order.event_id,
            status: order.status,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub used: usize,
    /// Sum of totals over confirmed and used orders.
    pub revenue: Decimal,
}

impl OrderStats {
    pub fn tally(orders: &[Order]) -> Self {
        orders.iter().fold(Self::default(), |mut stats, order| {
            stats.total += 1;
            match order.status {
                OrderStatus::Pending => stats.pending += 1,
                OrderStatus::Confirmed => {
                    stats.confirmed += 1;
                    stats.revenue += order.total;
                }
                OrderStatus::Used => {
                    stats.used += 1;
                    stats.revenue += order.total;
                }
                OrderStatus::Cancelled => stats.cancelled += 1,
            }
            stats
        })
    }
}

/// `<PREFIX>-<unix millis>-<8 upper-case alphanumerics>`
pub fn generate_reference(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!("{}-{}-{}", prefix, now.timestamp_millis(), suffix)
}

fn validate_buyer(buyer: &BuyerContact) -> Result<(), OrderError> {
    if buyer.name.trim().is_empty() {
        return Err(OrderError::InvalidRequest("Buyer name is required".to_string()));
    }
    if !buyer.email.contains('@') {
        return Err(OrderError::InvalidRequest(
            "A valid buyer email is required".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn TicketStore>,
    promos: PromoService,
    settings: Arc<OrderSettings>,
    notifier: broadcast::Sender<OrderNotification>,
}

impl OrderService {
    pub fn new(store: Arc<dyn TicketStore>, promos: PromoService, settings: OrderSettings) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            store,
            promos,
            settings: Arc::new(settings),
            notifier,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderNotification> {
        self.notifier.subscribe()
    }

    fn notify(&self, order: &Order) {
        // No receivers is fine
        let _ = self.notifier.send(OrderNotification::from(order));
    }

    pub async fn availability(&self, event_id: Uuid) -> Result<Vec<TierAvailability>, StoreError> {
        let tiers = self.store.event_tiers(event_id).await?;
        Ok(tiers.iter().map(TierAvailability::from).collect())
    }

    pub async fn check_availability(
        &self,
        event_id: Uuid,
        lines: &[TicketRequest],
    ) -> Result<AvailabilityCheck, StoreError> {
        let tiers = self.store.event_tiers(event_id).await?;
        match inventory::check_availability(&tiers, event_id, lines) {
            Err(OrderError::Storage(e)) => Err(e),
            result => Ok(result.into()),
        }
    }

    /// Prices the request from live tiers, applies the promo code and stores
    /// a `pending` order. Inventory is not touched until confirmation.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrderError> {
        validate_buyer(&request.buyer)?;

        let event_id = request.event_id;
        let lines = inventory::normalize(&request.tickets);
        let tiers = self.store.event_tiers(event_id).await?;
        inventory::check_availability(&tiers, event_id, &lines)?;

        let tickets = lines
            .iter()
            .map(|line| {
                tiers
                    .iter()
                    .find(|tier| tier.id == line.tier_id)
                    .map(|tier| LineItem {
                        tier_id: tier.id,
                        tier_name: tier.name.clone(),
                        quantity: line.quantity,
                        unit_price: tier.price,
                    })
                    .ok_or(OrderError::UnknownTier(line.tier_id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let subtotal: Decimal = tickets.iter().map(LineItem::line_total).sum();

        let (discount, promo_code) = match request
            .promo_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
        {
            Some(code) => {
                let quote = self
                    .promos
                    .quote(code, subtotal, Some(event_id))
                    .await?
                    .map_err(OrderError::InvalidPromo)?;
                (quote.discount, Some(quote.code))
            }
            None => (Decimal::ZERO, None),
        };

        let now = Utc::now();
        let tx_ref = match request.tx_ref.as_deref().map(str::trim) {
            Some("") => {
                return Err(OrderError::InvalidRequest(
                    "Payment reference must not be blank".to_string(),
                ))
            }
            Some(reference) => reference.to_string(),
            None => generate_reference(&self.settings.tx_ref_prefix, now),
        };

        let final_subtotal = (subtotal - discount).max(Decimal::ZERO);
        let order = Order {
            id: Uuid::new_v4(),
            tx_ref,
            event_id,
            tickets,
            subtotal,
            service_fee: self.settings.service_fee,
            discount,
            promo_code,
            total: final_subtotal + self.settings.service_fee,
            buyer: request.buyer,
            payment_method: request.payment_method,
            status: OrderStatus::Pending,
            created_at: now,
            confirmed_at: None,
            transaction_id: None,
            cancelled_at: None,
            used_at: None,
            admitted_by: None,
        };

        self.store.insert_order(order.clone()).await?;
        info!(
            order_id = %order.id,
            tx_ref = %order.tx_ref,
            event_id = %order.event_id,
            total = %order.total,
            "Order created"
        );
        self.notify(&order);

        Ok(order)
    }

    /// `Ok(None)` when no such order exists. Confirming an already-confirmed
    /// order returns it unchanged without deducting again.
    pub async fn confirm_order(
        &self,
        id: Uuid,
        transaction_id: Option<String>,
    ) -> Result<Option<Order>, OrderError> {
        let now = Utc::now();
        let (order, outcome) = match self.store.confirm_order(id, transaction_id, now).await {
            Ok(Some(confirmed)) => confirmed,
            Ok(None) => {
                debug!(order_id = %id, "Nothing to confirm");
                return Ok(None);
            }
            Err(e) => {
                warn!(order_id = %id, error = %e, "Confirmation rejected");
                return Err(e);
            }
        };

        if outcome == Confirmation::Applied {
            info!(
                order_id = %order.id,
                tx_ref = %order.tx_ref,
                event_id = %order.event_id,
                tickets = order.ticket_count(),
                "Order confirmed"
            );
            self.notify(&order);
        } else {
            debug!(order_id = %order.id, "Order already confirmed");
        }
        Ok(Some(order))
    }

    /// Variant used by asynchronous payment callbacks.
    pub async fn confirm_order_by_reference(
        &self,
        tx_ref: &str,
        transaction_id: Option<String>,
    ) -> Result<Option<Order>, OrderError> {
        match self.store.order_by_reference(tx_ref.trim()).await? {
            Some(order) => self.confirm_order(order.id, transaction_id).await,
            None => {
                warn!(tx_ref = %tx_ref, "Payment callback for unknown reference");
                Ok(None)
            }
        }
    }

    pub async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        transaction_id: Option<String>,
    ) -> Result<Option<Order>, OrderError> {
        if status == OrderStatus::Confirmed {
            return self.confirm_order(id, transaction_id).await;
        }
        let stamp = TransitionStamp {
            transaction_id,
            actor: None,
        };
        self.transition(id, status, stamp).await
    }

    /// Applies a cancel or use transition against freshly read state.
    pub async fn transition(
        &self,
        id: Uuid,
        to: OrderStatus,
        stamp: TransitionStamp,
    ) -> Result<Option<Order>, OrderError> {
        match self.store.transition_order(id, to, stamp, Utc::now()).await {
            Ok(Some(order)) => {
                info!(order_id = %order.id, tx_ref = %order.tx_ref, to = %to, "Order status changed");
                self.notify(&order);
                Ok(Some(order))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(order_id = %id, to = %to, error = %e, "Transition rejected");
                Err(e)
            }
        }
    }

    pub async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        self.store.order(id).await
    }

    pub async fn order_by_reference(&self, tx_ref: &str) -> Result<Option<Order>, StoreError> {
        self.store.order_by_reference(tx_ref).await
    }

    pub async fn orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        self.store.orders(status).await
    }

    /// Explicit admin removal of an order record.
    pub async fn delete_order(&self, id: Uuid) -> Result<bool, StoreError> {
        let deleted = self.store.delete_order(id).await?;
        if deleted {
            info!(order_id = %id, "Order deleted");
        }
        Ok(deleted)
    }

    pub async fn order_stats(&self) -> Result<OrderStats, StoreError> {
        let orders = self.store.orders(None).await?;
        Ok(OrderStats::tally(&orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscountType, PromoCode, TicketTier};
    use crate::store::MemoryStore;
    use chrono::Duration;

    struct Fixture {
        service: OrderService,
        store: Arc<MemoryStore>,
        event_id: Uuid,
        tier: TicketTier,
    }

    async fn fixture(capacity: i32, sold: i32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let event_id = Uuid::new_v4();
        let tier = TicketTier::new(event_id, "Regular", Decimal::from(5000), capacity).with_sold(sold);
        store.upsert_tier(tier.clone()).await.unwrap();

        let dyn_store: Arc<dyn TicketStore> = store.clone();
        let service = OrderService::new(
            dyn_store.clone(),
            PromoService::new(dyn_store),
            OrderSettings {
                service_fee: Decimal::from(500),
                tx_ref_prefix: "SOP".to_string(),
            },
        );
        Fixture {
            service,
            store,
            event_id,
            tier,
        }
    }

    fn request(f: &Fixture, quantity: u32) -> CreateOrderRequest {
        CreateOrderRequest {
            event_id: f.event_id,
            tickets: vec![TicketRequest {
                tier_id: f.tier.id,
                quantity,
            }],
            buyer: BuyerContact {
                name: "Ada Obi".to_string(),
                email: "ada@example.com".to_string(),
                phone: "08000000000".to_string(),
            },
            payment_method: PaymentMethod::Card,
            promo_code: None,
            tx_ref: None,
        }
    }

    async fn sold(f: &Fixture) -> i32 {
        f.store.event_tiers(f.event_id).await.unwrap()[0].sold
    }

    #[tokio::test]
    async fn test_create_prices_order_and_leaves_inventory() {
        let f = fixture(50, 0).await;
        let order = f.service.create_order(request(&f, 2)).await.unwrap();

        assert_eq!(order.subtotal, Decimal::from(10000));
        assert_eq!(order.total, Decimal::from(10500));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.tx_ref.starts_with("SOP-"));
        assert_eq!(sold(&f).await, 0);
    }

    #[tokio::test]
    async fn test_create_fails_without_persisting_when_unavailable() {
        let f = fixture(50, 45).await;
        let err = f.service.create_order(request(&f, 10)).await.unwrap_err();

        assert_eq!(err.to_string(), "Only 5 seats left for Regular");
        assert!(f.service.orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_deducts_once() {
        let f = fixture(50, 0).await;
        let order = f.service.create_order(request(&f, 2)).await.unwrap();

        let confirmed = f
            .service
            .confirm_order(order.id, Some("TX-9".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
        assert_eq!(confirmed.transaction_id.as_deref(), Some("TX-9"));
        assert_eq!(sold(&f).await, 2);

        f.service.confirm_order(order.id, None).await.unwrap();
        assert_eq!(sold(&f).await, 2);
    }

    #[tokio::test]
    async fn test_confirm_unknown_order_is_none() {
        let f = fixture(50, 0).await;
        assert!(f.service.confirm_order(Uuid::new_v4(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_order_cannot_be_confirmed() {
        let f = fixture(50, 0).await;
        let order = f.service.create_order(request(&f, 2)).await.unwrap();
        f.service
            .update_order_status(order.id, OrderStatus::Cancelled, None)
            .await
            .unwrap();

        let err = f.service.confirm_order(order.id, None).await.unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { .. }));
        assert_eq!(sold(&f).await, 0);
        let stored = f.service.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_promo_applied_and_counted_on_confirm() {
        let f = fixture(50, 0).await;
        f.store
            .upsert_promo_code(PromoCode {
                code: "sopab12".to_string(),
                discount_type: DiscountType::Percentage,
                discount_value: Decimal::from(20),
                min_purchase: Decimal::from(5000),
                max_uses: 10,
                used_count: 0,
                valid_from: Utc::now() - Duration::days(1),
                valid_until: Utc::now() + Duration::days(1),
                event_id: Some(f.event_id),
                is_active: true,
            })
            .await
            .unwrap();

        let mut req = request(&f, 4);
        req.promo_code = Some("SopAB12".to_string());
        let order = f.service.create_order(req).await.unwrap();
        assert_eq!(order.discount, Decimal::from(4000));
        assert_eq!(order.total, Decimal::from(16500));
        assert_eq!(order.promo_code.as_deref(), Some("SOPAB12"));

        let before = f.store.promo_code("SOPAB12").await.unwrap().unwrap();
        assert_eq!(before.used_count, 0);

        f.service.confirm_order(order.id, None).await.unwrap();
        f.service.confirm_order(order.id, None).await.unwrap();
        let after = f.store.promo_code("SOPAB12").await.unwrap().unwrap();
        assert_eq!(after.used_count, 1);
    }

    #[tokio::test]
    async fn test_invalid_promo_blocks_creation() {
        let f = fixture(50, 0).await;
        let mut req = request(&f, 1);
        req.promo_code = Some("NOPE".to_string());

        let err = f.service.create_order(req).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid promo code");
        assert!(f.service.orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let f = fixture(50, 0).await;
        let mut req = request(&f, 1);
        req.tx_ref = Some("SOP-FIXED".to_string());
        f.service.create_order(req.clone()).await.unwrap();

        let err = f.service.create_order(req).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Storage(StoreError::DuplicateReference(_))
        ));
    }

    #[tokio::test]
    async fn test_confirm_by_reference() {
        let f = fixture(50, 0).await;
        let order = f.service.create_order(request(&f, 1)).await.unwrap();

        let confirmed = f
            .service
            .confirm_order_by_reference(&order.tx_ref, Some("FLW-1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.id, order.id);
        assert!(f
            .service
            .confirm_order_by_reference("SOP-0-MISSING", None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_notifications_published() {
        let f = fixture(50, 0).await;
        let mut rx = f.service.subscribe();
        let order = f.service.create_order(request(&f, 1)).await.unwrap();
        f.service.confirm_order(order.id, None).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().status, OrderStatus::Pending);
        let confirmed = rx.recv().await.unwrap();
        assert_eq!(confirmed.order_id, order.id);
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_repeat_confirm_is_not_announced() {
        let f = fixture(50, 0).await;
        let order = f.service.create_order(request(&f, 1)).await.unwrap();
        let mut rx = f.service.subscribe();

        f.service.confirm_order(order.id, None).await.unwrap();
        f.service.confirm_order(order.id, None).await.unwrap();
        f.service.confirm_order_by_reference(&order.tx_ref, None).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().status, OrderStatus::Confirmed);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_stats_count_revenue_for_confirmed_and_used() {
        let f = fixture(50, 0).await;
        let a = f.service.create_order(request(&f, 1)).await.unwrap();
        let b = f.service.create_order(request(&f, 2)).await.unwrap();
        let c = f.service.create_order(request(&f, 1)).await.unwrap();
        f.service.create_order(request(&f, 1)).await.unwrap();

        f.service.confirm_order(a.id, None).await.unwrap();
        f.service.confirm_order(b.id, None).await.unwrap();
        f.service
            .update_order_status(b.id, OrderStatus::Used, None)
            .await
            .unwrap();
        f.service
            .update_order_status(c.id, OrderStatus::Cancelled, None)
            .await
            .unwrap();

        let stats = f.service.order_stats().await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.confirmed, 1);
        assert_eq!(stats.used, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.revenue, Decimal::from(5500 + 10500));
    }

    #[tokio::test]
    async fn test_blank_buyer_rejected() {
        let f = fixture(50, 0).await;
        let mut req = request(&f, 1);
        req.buyer.email = "not-an-email".to_string();
        assert!(matches!(
            f.service.create_order(req).await,
            Err(OrderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_generated_reference_shape() {
        let reference = generate_reference("SOP", Utc::now());
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "SOP");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
