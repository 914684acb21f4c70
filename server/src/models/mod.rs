pub mod order;
pub mod promo_code;
pub mod ticket;

pub use order::{BuyerContact, LineItem, Order, OrderStatus, PaymentMethod};
pub use promo_code::{normalize_code, DiscountType, PromoCode};
pub use ticket::{TicketTier, TierAvailability};
