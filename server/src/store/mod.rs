//! Record store for tiers, promo codes and orders.
//!
//! Plain reads and writes map one-to-one onto the store. The two operations
//! that race in practice, confirmation and status transitions, are exposed
//! as single atomic calls so each backend can hold its lock or transaction
//! across the whole read, decide, write sequence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Order, OrderStatus, PromoCode, TicketTier};
use crate::services::lifecycle::{Confirmation, TransitionStamp};
use crate::utils::error::{OrderError, StoreError};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Creates or replaces a tier. Admin tooling owns everything but `sold`.
    async fn upsert_tier(&self, tier: TicketTier) -> Result<(), StoreError>;

    async fn event_tiers(&self, event_id: Uuid) -> Result<Vec<TicketTier>, StoreError>;

    /// Creates or replaces a promo code, keyed by its normalized code.
    async fn upsert_promo_code(&self, promo: PromoCode) -> Result<(), StoreError>;

    /// `code` must already be normalized.
    async fn promo_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError>;

    /// Adds one use unless the code is unknown or at its cap.
    async fn increment_promo_usage(&self, code: &str) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::DuplicateReference`] when `tx_ref` is taken.
    async fn insert_order(&self, order: Order) -> Result<(), StoreError>;

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn order_by_reference(&self, tx_ref: &str) -> Result<Option<Order>, StoreError>;

    async fn orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError>;

    /// Returns false when no such order existed.
    async fn delete_order(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Atomically confirms a pending order, deducting inventory and counting
    /// the promo code use. `Ok(None)` when the order does not exist. An
    /// already-confirmed order is returned unchanged with
    /// [`Confirmation::AlreadyConfirmed`].
    async fn confirm_order(
        &self,
        id: Uuid,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<(Order, Confirmation)>, OrderError>;

    /// Atomically re-reads the order and applies a cancel or use transition.
    async fn transition_order(
        &self,
        id: Uuid,
        to: OrderStatus,
        stamp: TransitionStamp,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, OrderError>;
}
