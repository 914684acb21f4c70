pub mod inventory;
pub mod lifecycle;
pub mod orders;
pub mod promo;
pub mod redemption;

pub use orders::{CreateOrderRequest, OrderService, OrderSettings};
pub use promo::PromoService;
pub use redemption::RedemptionVerifier;
