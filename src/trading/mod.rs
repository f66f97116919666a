pub mod orchestrator;
pub mod order_router;
pub mod risk_manager;

pub use orchestrator::{CycleSummary, TradingOrchestrator};
pub use order_router::{map_exchange_status, OrderRouter, RouterError};
pub use risk_manager::{RiskManager, ValidatedOrder};
