use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{events, health_check, orders, promo, tickets};
use crate::state::AppState;

/// API routes without middleware; used directly by tests.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/events/:event_id/availability", get(events::get_availability))
        .route(
            "/api/events/:event_id/availability/check",
            post(events::check_availability),
        )
        .route(
            "/api/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route("/api/orders/stats", get(orders::order_stats))
        .route(
            "/api/orders/:id",
            get(orders::get_order).delete(orders::delete_order),
        )
        .route("/api/orders/:id/confirm", post(orders::confirm_order))
        .route("/api/orders/:id/status", post(orders::update_status))
        .route("/api/payments/callback", post(orders::payment_callback))
        .route("/api/promo-codes/validate", post(promo::validate_promo_code))
        .route("/api/promo-codes/:code/use", post(promo::mark_promo_code_used))
        .route("/api/tickets/verify", post(tickets::verify_ticket))
        .route("/api/tickets/:order_id/admit", post(tickets::admit_ticket))
        .with_state(state)
}

pub fn create_routes(state: AppState, config: &Config) -> Router {
    api_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.cors_allowed_origins))
}
