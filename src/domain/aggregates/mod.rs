pub mod cart;
pub mod order;
pub mod payment;
pub mod platform;
pub mod service;
pub mod user;

pub use cart::CartItem;
pub use order::{FulfillmentTicket, Order, OrderStatus};
pub use payment::{PaymentMethod, PaymentRequest, PaymentStatus};
pub use platform::Platform;
pub use service::{PriceTier, ServicePackage};
pub use user::{LedgerEntry, LedgerReason, User, UserRole};
