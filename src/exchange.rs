//! Abstract venue connection. The reconciler and orchestrator only ever
//! talk to an `ExchangePort` — no CLOB wire format leaks past this module.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::types::{Balances, Fill, OpenOrder, Side};

/// GTC-only limit-order venue connection. Implementations are expected to
/// map venue-specific errors into the `EngineError` taxonomy: a rejected
/// order is `EngineError::Rejection`, a dropped connection is
/// `EngineError::Transport`.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    async fn get_balances(&self) -> Result<Balances, EngineError>;
    async fn list_open_orders(&self) -> Result<Vec<OpenOrder>, EngineError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), EngineError>;
    /// Returns the venue order id on success.
    async fn place_limit_order(
        &self,
        side: Side,
        asset_id: &str,
        price: f64,
        size: f64,
    ) -> Result<String, EngineError>;
    /// Fills with `ts_ms > since_ms`, strictly. May be truncated by the
    /// venue; the caller advances its watermark to the max fill timestamp
    /// seen rather than assuming completeness.
    async fn get_fills(&self, since_ms: i64) -> Result<Vec<Fill>, EngineError>;
}

/// Paper-trading exchange: every order fills immediately at its limit
/// price, and `list_open_orders` always reports empty (nothing ever
/// rests). Used when `--dry-run` is passed, mirroring the gateway's
/// dry-run branch in a connected venue implementation.
pub struct DryRunExchange {
    balances: Mutex<Balances>,
    pending_fills: Mutex<Vec<Fill>>,
    next_id: Mutex<u64>,
}

impl DryRunExchange {
    pub fn new(starting_balances: Balances) -> Self {
        Self {
            balances: Mutex::new(starting_balances),
            pending_fills: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }
}

#[async_trait]
impl ExchangePort for DryRunExchange {
    async fn get_balances(&self) -> Result<Balances, EngineError> {
        Ok(self.balances.lock().await.clone())
    }

    async fn list_open_orders(&self) -> Result<Vec<OpenOrder>, EngineError> {
        Ok(Vec::new())
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn place_limit_order(
        &self,
        side: Side,
        asset_id: &str,
        price: f64,
        size: f64,
    ) -> Result<String, EngineError> {
        let order_id = {
            let mut n = self.next_id.lock().await;
            let id = *n;
            *n += 1;
            id
        };

        {
            let mut bal = self.balances.lock().await;
            match side {
                Side::Buy => {
                    bal.yes += size;
                    bal.usdc -= price * size;
                }
                Side::Sell => {
                    bal.yes -= size;
                    bal.usdc += price * size;
                }
            }
        }

        self.pending_fills.lock().await.push(Fill {
            ts_ms: chrono::Utc::now().timestamp_millis(),
            order_id: order_id.to_string(),
            asset_id: asset_id.to_string(),
            side,
            price,
            size,
        });

        Ok(order_id.to_string())
    }

    async fn get_fills(&self, since_ms: i64) -> Result<Vec<Fill>, EngineError> {
        let fills = self.pending_fills.lock().await;
        Ok(fills.iter().filter(|f| f.ts_ms > since_ms).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_fills_immediately_and_updates_balance() {
        let ex = DryRunExchange::new(Balances { yes: 0.0, no: 0.0, usdc: 100.0 });
        let id = ex.place_limit_order(Side::Buy, "yes-token", 0.5, 10.0).await.unwrap();
        assert!(!id.is_empty());
        let bal = ex.get_balances().await.unwrap();
        assert!((bal.yes - 10.0).abs() < 1e-9);
        assert!((bal.usdc - 95.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn get_fills_respects_watermark() {
        let ex = DryRunExchange::new(Balances::default());
        ex.place_limit_order(Side::Buy, "yes", 0.5, 1.0).await.unwrap();
        let fills = ex.get_fills(0).await.unwrap();
        assert_eq!(fills.len(), 1);
        let future_watermark = fills[0].ts_ms + 1;
        let none = ex.get_fills(future_watermark).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn list_open_orders_always_empty() {
        let ex = DryRunExchange::new(Balances::default());
        assert!(ex.list_open_orders().await.unwrap().is_empty());
    }
}
