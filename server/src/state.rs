use std::sync::Arc;

use crate::services::{OrderService, OrderSettings, PromoService, RedemptionVerifier};
use crate::store::TicketStore;

/// Shared handler state. Every service is a cheap clone over the same store.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub promos: PromoService,
    pub redemption: RedemptionVerifier,
}

impl AppState {
    pub fn new(store: Arc<dyn TicketStore>, settings: OrderSettings) -> Self {
        let promos = PromoService::new(store.clone());
        let orders = OrderService::new(store, promos.clone(), settings);
        let redemption = RedemptionVerifier::new(orders.clone());
        Self {
            orders,
            promos,
            redemption,
        }
    }
}
