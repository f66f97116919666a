//! Risk-checked order routing.
//!
//! [`OrderRouter::route_order`] is a single straight-line attempt: validate,
//! resolve the connector, submit at most once, persist. Every call leaves
//! exactly one row in the order store, whether it succeeds or fails.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use super::risk_manager::{RiskManager, ValidatedOrder};
use crate::connectors::{ConnectorProvider, ExchangeConnector, ExchangeOrder, OrderPayload};
use crate::core::{ConnectorError, ConnectorNotFoundError, RiskCheckError, StorageError};
use crate::models::{Order, OrderRequest, OrderStatus, OrderType};
use crate::storage::OrderStore;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("risk check failed: {0}")]
    Risk(#[from] RiskCheckError),

    #[error(transparent)]
    ConnectorNotFound(#[from] ConnectorNotFoundError),

    #[error("exchange error: {0}")]
    Exchange(#[from] ConnectorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("order {0} not found")]
    UnknownOrder(String),

    #[error("order {id} is {status} and cannot be changed")]
    InvalidState { id: String, status: OrderStatus },
}

/// Maps a unified exchange status onto the local lifecycle.
pub fn map_exchange_status(status: &str, filled: f64) -> OrderStatus {
    match status.to_ascii_lowercase().as_str() {
        "closed" if filled > 0.0 => OrderStatus::Filled,
        "canceled" | "cancelled" => OrderStatus::Canceled,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Open,
    }
}

pub struct OrderRouter {
    store: Arc<dyn OrderStore>,
    connectors: Arc<dyn ConnectorProvider>,
    risk: RiskManager,
}

impl OrderRouter {
    pub fn new(
        store: Arc<dyn OrderStore>,
        connectors: Arc<dyn ConnectorProvider>,
        risk: RiskManager,
    ) -> Self {
        Self {
            store,
            connectors,
            risk,
        }
    }

    pub async fn route_order(
        &self,
        user_id: &str,
        connector_name: &str,
        request: &OrderRequest,
    ) -> Result<Order, RouterError> {
        let validated = match self.risk.check_risk_limits(request, None) {
            Ok(validated) => validated,
            Err(e) => return self.reject(user_id, connector_name, request, e.into()).await,
        };

        let connector = match self.connectors.connect(connector_name) {
            Ok(connector) => connector,
            Err(e) => return self.reject(user_id, connector_name, request, e.into()).await,
        };

        let result = self
            .submit(user_id, connector.as_ref(), request, validated)
            .await;

        if let Err(e) = connector.close().await {
            tracing::warn!(connector = connector_name, error = %e, "connector close failed");
        }

        result
    }

    async fn submit(
        &self,
        user_id: &str,
        connector: &dyn ExchangeConnector,
        request: &OrderRequest,
        validated: ValidatedOrder,
    ) -> Result<Order, RouterError> {
        if validated.order_type == OrderType::Market {
            let reference = match connector.fetch_price(&validated.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!(symbol = %validated.symbol, error = %e, "reference price unavailable");
                    let err = RiskCheckError::NoReferencePrice(validated.symbol.clone());
                    return self.reject(user_id, connector.name(), request, err.into()).await;
                }
            };
            if let Err(e) = self.risk.check_notional(validated.amount, reference) {
                return self.reject(user_id, connector.name(), request, e.into()).await;
            }
        }

        let mut order = Order::from_request(user_id, connector.name(), request, OrderStatus::Pending);
        order.symbol = validated.symbol.clone();
        order.side = validated.side.as_str().to_string();
        order.order_type = validated.order_type.as_str().to_string();
        order.price = validated.price;
        self.store.insert_order(&order).await?;

        let payload = OrderPayload {
            client_order_id: order.id.clone(),
            symbol: validated.symbol,
            side: validated.side,
            order_type: validated.order_type,
            amount: validated.amount,
            price: validated.price,
        };

        match connector.create_order(&payload).await {
            Ok(ack) => {
                self.apply_ack(&mut order, &ack);
                self.store.update_order(&order).await?;

                tracing::info!(
                    order_id = %order.id,
                    external_id = %ack.id,
                    connector = connector.name(),
                    symbol = %order.symbol,
                    side = %order.side,
                    status = %order.status,
                    "order routed"
                );
                Ok(order)
            }
            Err(e) => {
                order.status = OrderStatus::Rejected;
                order.reason = Some(e.to_string());
                order.updated_at = Utc::now();
                self.store.update_order(&order).await?;

                tracing::error!(
                    order_id = %order.id,
                    connector = connector.name(),
                    symbol = %order.symbol,
                    error = %e,
                    "order submission failed"
                );
                Err(RouterError::Exchange(e))
            }
        }
    }

    fn apply_ack(&self, order: &mut Order, ack: &ExchangeOrder) {
        order.status = map_exchange_status(&ack.status, ack.filled);
        order.external_id = Some(ack.id.clone());
        if let Some(average) = ack.average_price {
            order.price = Some(average);
        }
        if order.status == OrderStatus::Rejected {
            order.reason = Some(format!("rejected by {}", order.connector));
        }
        order.updated_at = Utc::now();
    }

    async fn reject(
        &self,
        user_id: &str,
        connector_name: &str,
        request: &OrderRequest,
        err: RouterError,
    ) -> Result<Order, RouterError> {
        let order = Order::rejected(user_id, connector_name, request, err.to_string());
        self.store.insert_order(&order).await?;

        tracing::warn!(
            order_id = %order.id,
            connector = connector_name,
            symbol = %request.symbol,
            side = %request.side,
            reason = %err,
            "order rejected"
        );
        Err(err)
    }

    /// Cancels a resting order on its exchange and records the result.
    pub async fn cancel_order(&self, order_id: &str) -> Result<Order, RouterError> {
        let (mut order, external_id) = self.load_live(order_id).await?;
        let connector = self.connectors.connect(&order.connector)?;

        let result = connector.cancel_order(&external_id, &order.symbol).await;
        if let Err(e) = connector.close().await {
            tracing::warn!(connector = %order.connector, error = %e, "connector close failed");
        }
        let ack = result?;

        self.apply_ack(&mut order, &ack);
        self.store.update_order(&order).await?;
        tracing::info!(order_id, status = %order.status, "order canceled");

        Ok(order)
    }

    /// Pulls the latest exchange state for an order that is still live.
    pub async fn refresh_order(&self, order_id: &str) -> Result<Order, RouterError> {
        let (mut order, external_id) = self.load_live(order_id).await?;
        let connector = self.connectors.connect(&order.connector)?;

        let result = connector.fetch_order(&external_id, &order.symbol).await;
        if let Err(e) = connector.close().await {
            tracing::warn!(connector = %order.connector, error = %e, "connector close failed");
        }
        let ack = result?;

        let previous = order.status;
        self.apply_ack(&mut order, &ack);
        if order.status != previous {
            self.store.update_order(&order).await?;
            tracing::info!(order_id, from = %previous, to = %order.status, "order status changed");
        }

        Ok(order)
    }

    async fn load_live(&self, order_id: &str) -> Result<(Order, String), RouterError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| RouterError::UnknownOrder(order_id.to_string()))?;

        match (&order.external_id, order.status.is_terminal()) {
            (Some(external_id), false) => {
                let external_id = external_id.clone();
                Ok((order, external_id))
            }
            _ => Err(RouterError::InvalidState {
                id: order.id.clone(),
                status: order.status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_with_fill_is_filled() {
        for filled in [1e-9, 0.5, 1.0, 1e6] {
            assert_eq!(map_exchange_status("closed", filled), OrderStatus::Filled);
        }
    }

    #[test]
    fn test_closed_without_fill_is_open() {
        assert_eq!(map_exchange_status("closed", 0.0), OrderStatus::Open);
    }

    #[test]
    fn test_terminal_statuses() {
        assert_eq!(map_exchange_status("canceled", 0.0), OrderStatus::Canceled);
        assert_eq!(map_exchange_status("cancelled", 0.3), OrderStatus::Canceled);
        assert_eq!(map_exchange_status("rejected", 0.0), OrderStatus::Rejected);
    }

    #[test]
    fn test_anything_else_is_open() {
        for status in ["open", "new", "partially_filled", "expired", ""] {
            assert_eq!(map_exchange_status(status, 0.0), OrderStatus::Open);
        }
    }
}
