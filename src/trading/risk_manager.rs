use crate::core::config::RiskConfig;
use crate::core::RiskCheckError;
use crate::models::{OrderRequest, OrderType, Side};

/// An order request that passed every static check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOrder {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn limits(&self) -> &RiskConfig {
        &self.config
    }

    /// Runs the pre-trade checks in order: side, symbol, order type, price,
    /// amount bounds, then order value.
    ///
    /// Limit orders are valued at their own price. Market orders are valued
    /// at `reference_price` only; any price on a market request is dropped,
    /// since the venue fills at market regardless. A market order with no
    /// reference price passes the static checks, and the caller must then
    /// call [`RiskManager::check_notional`] before submitting it.
    pub fn check_risk_limits(
        &self,
        request: &OrderRequest,
        reference_price: Option<f64>,
    ) -> Result<ValidatedOrder, RiskCheckError> {
        let side: Side = request
            .side
            .parse()
            .map_err(|_| RiskCheckError::InvalidSide(request.side.clone()))?;

        let symbol = request.symbol.trim();
        if !symbol.contains('/') {
            return Err(RiskCheckError::InvalidSymbol(request.symbol.clone()));
        }

        let order_type: OrderType = request
            .order_type
            .parse()
            .map_err(|_| RiskCheckError::InvalidOrderType(request.order_type.clone()))?;

        if let Some(price) = request.price {
            if !price.is_finite() || price <= 0.0 {
                return Err(RiskCheckError::InvalidPrice(price));
            }
        }
        if order_type == OrderType::Limit && request.price.is_none() {
            return Err(RiskCheckError::MissingPrice);
        }

        let amount = request.amount;
        if !amount.is_finite()
            || amount < self.config.min_order_qty
            || amount > self.config.max_order_qty
        {
            return Err(RiskCheckError::AmountOutOfRange {
                amount,
                min: self.config.min_order_qty,
                max: self.config.max_order_qty,
            });
        }

        let price = match order_type {
            OrderType::Limit => request.price,
            OrderType::Market => None,
        };
        if let Some(value_price) = price.or(reference_price) {
            self.check_notional(amount, value_price)?;
        }

        Ok(ValidatedOrder {
            symbol: symbol.to_string(),
            side,
            order_type,
            amount,
            price,
        })
    }

    pub fn check_notional(&self, amount: f64, price: f64) -> Result<(), RiskCheckError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(RiskCheckError::InvalidPrice(price));
        }

        let value = amount * price;
        if value > self.config.max_order_usd {
            tracing::warn!(
                value,
                max = self.config.max_order_usd,
                "order value above limit"
            );
            return Err(RiskCheckError::NotionalExceeded {
                value,
                max: self.config.max_order_usd,
            });
        }
        Ok(())
    }
}
