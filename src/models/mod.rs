pub mod order;
pub mod subscription;

pub use order::{Order, OrderRequest, OrderStatus, OrderType, Side};
pub use subscription::{Subscription, SubscriptionStatus};
