use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::TicketStore;
use crate::models::{
    normalize_code, BuyerContact, LineItem, Order, OrderStatus, PromoCode, TicketTier,
};
use crate::services::lifecycle::{self, Confirmation, TransitionStamp};
use crate::utils::error::{OrderError, StoreError};

const TIER_COLUMNS: &str =
    "id, event_id, name, price, available, sold, max_per_person, created_at, updated_at";

const PROMO_COLUMNS: &str = "code, discount_type, discount_value, min_purchase, max_uses, \
     used_count, valid_from, valid_until, event_id, is_active";

const ORDER_COLUMNS: &str = "id, tx_ref, event_id, tickets, subtotal, service_fee, discount, \
     promo_code, total, buyer_name, buyer_email, buyer_phone, payment_method, status, \
     created_at, confirmed_at, transaction_id, cancelled_at, used_at, admitted_by";

#[derive(FromRow)]
struct PromoRow {
    code: String,
    discount_type: String,
    discount_value: Decimal,
    min_purchase: Decimal,
    max_uses: i32,
    used_count: i32,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    event_id: Option<Uuid>,
    is_active: bool,
}

impl TryFrom<PromoRow> for PromoCode {
    type Error = StoreError;

    fn try_from(row: PromoRow) -> Result<Self, Self::Error> {
        Ok(PromoCode {
            discount_type: row.discount_type.parse().map_err(StoreError::Corrupt)?,
            code: row.code,
            discount_value: row.discount_value,
            min_purchase: row.min_purchase,
            max_uses: row.max_uses,
            used_count: row.used_count,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            event_id: row.event_id,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    tx_ref: String,
    event_id: Uuid,
    tickets: Json<Vec<LineItem>>,
    subtotal: Decimal,
    service_fee: Decimal,
    discount: Decimal,
    promo_code: Option<String>,
    total: Decimal,
    buyer_name: String,
    buyer_email: String,
    buyer_phone: String,
    payment_method: String,
    status: String,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    transaction_id: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    used_at: Option<DateTime<Utc>>,
    admitted_by: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            tx_ref: row.tx_ref,
            event_id: row.event_id,
            tickets: row.tickets.0,
            subtotal: row.subtotal,
            service_fee: row.service_fee,
            discount: row.discount,
            promo_code: row.promo_code,
            total: row.total,
            buyer: BuyerContact {
                name: row.buyer_name,
                email: row.buyer_email,
                phone: row.buyer_phone,
            },
            payment_method: row.payment_method.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            confirmed_at: row.confirmed_at,
            transaction_id: row.transaction_id,
            cancelled_at: row.cancelled_at,
            used_at: row.used_at,
            admitted_by: row.admitted_by,
        })
    }
}

/// Postgres-backed store. Atomic operations lock the order row, then the
/// event's tier rows in id order, then the promo row, inside one
/// transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_order(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn save_order_state(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE orders SET status = $2, confirmed_at = $3, transaction_id = $4, \
             cancelled_at = $5, used_at = $6, admitted_by = $7 WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.confirmed_at)
        .bind(&order.transaction_id)
        .bind(order.cancelled_at)
        .bind(order.used_at)
        .bind(&order.admitted_by)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn upsert_tier(&self, tier: TicketTier) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ticket_tiers (id, event_id, name, price, available, sold, max_per_person, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, price = EXCLUDED.price, \
             available = EXCLUDED.available, max_per_person = EXCLUDED.max_per_person, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(tier.id)
        .bind(tier.event_id)
        .bind(&tier.name)
        .bind(tier.price)
        .bind(tier.available)
        .bind(tier.sold)
        .bind(tier.max_per_person)
        .bind(tier.created_at)
        .bind(tier.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn event_tiers(&self, event_id: Uuid) -> Result<Vec<TicketTier>, StoreError> {
        let tiers = sqlx::query_as::<_, TicketTier>(&format!(
            "SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE event_id = $1 ORDER BY price, name"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tiers)
    }

    async fn upsert_promo_code(&self, promo: PromoCode) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO promo_codes (code, discount_type, discount_value, min_purchase, max_uses, \
             used_count, valid_from, valid_until, event_id, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (code) DO UPDATE SET discount_type = EXCLUDED.discount_type, \
             discount_value = EXCLUDED.discount_value, min_purchase = EXCLUDED.min_purchase, \
             max_uses = EXCLUDED.max_uses, valid_from = EXCLUDED.valid_from, \
             valid_until = EXCLUDED.valid_until, event_id = EXCLUDED.event_id, \
             is_active = EXCLUDED.is_active",
        )
        .bind(normalize_code(&promo.code))
        .bind(promo.discount_type.as_str())
        .bind(promo.discount_value)
        .bind(promo.min_purchase)
        .bind(promo.max_uses)
        .bind(promo.used_count)
        .bind(promo.valid_from)
        .bind(promo.valid_until)
        .bind(promo.event_id)
        .bind(promo.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn promo_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let row = sqlx::query_as::<_, PromoRow>(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PromoCode::try_from).transpose()
    }

    async fn increment_promo_usage(&self, code: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE promo_codes SET used_count = used_count + 1 \
             WHERE code = $1 AND (max_uses = 0 OR used_count < max_uses)",
        )
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
             $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"
        ))
        .bind(order.id)
        .bind(&order.tx_ref)
        .bind(order.event_id)
        .bind(Json(&order.tickets))
        .bind(order.subtotal)
        .bind(order.service_fee)
        .bind(order.discount)
        .bind(&order.promo_code)
        .bind(order.total)
        .bind(&order.buyer.name)
        .bind(&order.buyer.email)
        .bind(&order.buyer.phone)
        .bind(order.payment_method.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.confirmed_at)
        .bind(&order.transaction_id)
        .bind(order.cancelled_at)
        .bind(order.used_at)
        .bind(&order.admitted_by)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateReference(order.tx_ref))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn order_by_reference(&self, tx_ref: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tx_ref = $1"
        ))
        .bind(tx_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn confirm_order(
        &self,
        id: Uuid,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<(Order, Confirmation)>, OrderError> {
        let mut tx = self.pool.begin().await?;

        let Some(mut order) = Self::lock_order(&mut tx, id).await? else {
            return Ok(None);
        };

        let mut tiers = sqlx::query_as::<_, TicketTier>(&format!(
            "SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE event_id = $1 ORDER BY id FOR UPDATE"
        ))
        .bind(order.event_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut promo = match order.promo_code.as_deref() {
            Some(code) => sqlx::query_as::<_, PromoRow>(&format!(
                "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1 FOR UPDATE"
            ))
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?
            .map(PromoCode::try_from)
            .transpose()?,
            None => None,
        };

        let outcome =
            lifecycle::apply_confirmation(&mut order, &mut tiers, promo.as_mut(), transaction_id, now)?;
        if outcome == Confirmation::AlreadyConfirmed {
            tx.rollback().await?;
            return Ok(Some((order, outcome)));
        }

        for tier in &tiers {
            sqlx::query("UPDATE ticket_tiers SET sold = $2, updated_at = $3 WHERE id = $1")
                .bind(tier.id)
                .bind(tier.sold)
                .bind(tier.updated_at)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(promo) = &promo {
            sqlx::query("UPDATE promo_codes SET used_count = $2 WHERE code = $1")
                .bind(&promo.code)
                .bind(promo.used_count)
                .execute(&mut *tx)
                .await?;
        }
        Self::save_order_state(&mut tx, &order).await?;

        tx.commit().await?;
        debug!(order_id = %order.id, "Confirmation committed");
        Ok(Some((order, outcome)))
    }

    async fn transition_order(
        &self,
        id: Uuid,
        to: OrderStatus,
        stamp: TransitionStamp,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, OrderError> {
        let mut tx = self.pool.begin().await?;

        let Some(mut order) = Self::lock_order(&mut tx, id).await? else {
            return Ok(None);
        };

        lifecycle::apply_transition(&mut order, to, stamp, now)?;
        Self::save_order_state(&mut tx, &order).await?;

        tx.commit().await?;
        Ok(Some(order))
    }
}
