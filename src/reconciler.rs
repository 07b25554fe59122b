//! Idempotent order-book reconciliation: compares desired ladder levels
//! against what's actually resting on the venue and issues the minimal
//! set of cancel/place calls to converge, one side at a time (bids then
//! asks), with per-level error isolation so one bad order never blocks
//! the rest of the cycle.

use serde_json::json;

use crate::exchange::ExchangePort;
use crate::telemetry::EventLogger;
use crate::types::{DesiredOrder, OpenOrder, Side};

/// Match tolerance for treating two prices as "the same level".
const PRICE_EPS: f64 = 1e-9;
/// Relative size drift beyond which a resting order gets replaced rather
/// than left alone.
const SIZE_DIFF_THRESHOLD: f64 = 0.25;

/// Reconcile both sides of the book. `asset_id` restricts which open
/// orders we consider ours to manage — orders on any other asset are
/// left untouched.
pub async fn reconcile(
    exchange: &dyn ExchangePort,
    logger: &mut EventLogger,
    asset_id: &str,
    bids: &[DesiredOrder],
    asks: &[DesiredOrder],
) {
    let existing = match exchange.list_open_orders().await {
        Ok(orders) => orders,
        Err(e) => {
            logger.log_error("reconcile_list_open_orders", &e, json!({}));
            return;
        }
    };

    let (existing_bids, existing_asks): (Vec<OpenOrder>, Vec<OpenOrder>) = existing
        .into_iter()
        .filter(|o| o.asset_id == asset_id)
        .partition(|o| o.side == Side::Buy);

    reconcile_side(exchange, logger, asset_id, Side::Buy, bids, existing_bids).await;
    reconcile_side(exchange, logger, asset_id, Side::Sell, asks, existing_asks).await;
}

async fn reconcile_side(
    exchange: &dyn ExchangePort,
    logger: &mut EventLogger,
    asset_id: &str,
    side: Side,
    wanted: &[DesiredOrder],
    existing: Vec<OpenOrder>,
) {
    let mut claimed = vec![false; existing.len()];

    for w in wanted {
        let found = existing
            .iter()
            .enumerate()
            .find(|(i, o)| !claimed[*i] && (o.price - w.price).abs() < PRICE_EPS);

        match found {
            Some((idx, existing_order)) => {
                claimed[idx] = true;
                let current_size = existing_order.size_remaining;
                let sz_diff = (w.size - current_size).abs() / current_size.max(1e-9);
                if sz_diff > SIZE_DIFF_THRESHOLD {
                    match exchange.cancel_order(&existing_order.order_id).await {
                        Ok(()) => {
                            if let Err(e) = exchange
                                .place_limit_order(side, asset_id, w.price, w.size)
                                .await
                            {
                                logger.log_error(
                                    "reconcile_replace_place",
                                    &e,
                                    json!({"side": side.to_string(), "price": w.price, "size": w.size}),
                                );
                            }
                        }
                        Err(e) => {
                            logger.log_error(
                                "reconcile_replace_cancel",
                                &e,
                                json!({"order_id": existing_order.order_id, "side": side.to_string()}),
                            );
                        }
                    }
                }
            }
            None => {
                if let Err(e) = exchange
                    .place_limit_order(side, asset_id, w.price, w.size)
                    .await
                {
                    logger.log_error(
                        "reconcile_place_new",
                        &e,
                        json!({"side": side.to_string(), "price": w.price, "size": w.size}),
                    );
                }
            }
        }
    }

    // Prune anything still resting that wasn't claimed by a wanted level.
    for (idx, order) in existing.iter().enumerate() {
        if claimed[idx] {
            continue;
        }
        if let Err(e) = exchange.cancel_order(&order.order_id).await {
            logger.log_error(
                "reconcile_prune_cancel",
                &e,
                json!({"order_id": order.order_id, "side": side.to_string()}),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::DryRunExchange;
    use crate::types::Balances;

    fn logger() -> EventLogger {
        let dir = std::env::temp_dir().join(format!("mm-reconciler-test-{}", std::process::id()));
        EventLogger::open(&dir.join("events.jsonl")).unwrap()
    }

    fn open(order_id: &str, side: Side, price: f64, size: f64, size_remaining: f64) -> OpenOrder {
        OpenOrder {
            order_id: order_id.to_string(),
            asset_id: "yes-token".to_string(),
            side,
            price,
            size,
            size_remaining,
        }
    }

    #[tokio::test]
    async fn places_new_level_when_nothing_resting() {
        let exchange = DryRunExchange::new(Balances { usdc: 1000.0, ..Default::default() });
        let mut log = logger();
        let bids = vec![DesiredOrder { level: 0, side: Side::Buy, price: 0.50, size: 5.0 }];
        reconcile(&exchange, &mut log, "yes-token", &bids, &[]).await;
        // DryRunExchange fills immediately so balances should move.
        let bal = exchange.get_balances().await.unwrap();
        assert!(bal.yes > 0.0);
    }

    /// S3: a resting order whose size has drifted more than 25% gets
    /// cancelled and replaced at the desired size.
    #[tokio::test]
    async fn resizes_when_relative_size_diff_exceeds_threshold() {
        let mut log = logger();
        let wanted = vec![DesiredOrder { level: 0, side: Side::Buy, price: 0.40, size: 30.0 }];
        let existing = vec![open("o1", Side::Buy, 0.40, 10.0, 10.0)];
        reconcile_side(&NullExchange, &mut log, "yes-token", Side::Buy, &wanted, existing).await;
        assert_eq!(take_calls(), vec!["cancel:o1", "place:BUY:0.4:30"]);
    }

    /// S4: an existing price with no matching desired level gets pruned;
    /// claimed prices are left untouched.
    #[tokio::test]
    async fn prunes_unclaimed_existing_orders() {
        let mut log = logger();
        let wanted = vec![
            DesiredOrder { level: 0, side: Side::Buy, price: 0.40, size: 10.0 },
            DesiredOrder { level: 1, side: Side::Buy, price: 0.38, size: 10.0 },
        ];
        let existing = vec![
            open("keep-1", Side::Buy, 0.40, 10.0, 10.0),
            open("keep-2", Side::Buy, 0.38, 10.0, 10.0),
            open("prune-me", Side::Buy, 0.35, 10.0, 10.0),
        ];
        reconcile_side(&NullExchange, &mut log, "yes-token", Side::Buy, &wanted, existing).await;
        assert_eq!(take_calls(), vec!["cancel:prune-me"]);
    }

    /// A no-op venue double that records which calls it received, for
    /// asserting on reconciler *behavior* rather than resulting balances.
    struct NullExchange;

    thread_local! {
        static CALLS: std::cell::RefCell<Vec<String>> = std::cell::RefCell::new(Vec::new());
    }

    fn take_calls() -> Vec<String> {
        CALLS.with(|c| std::mem::take(&mut *c.borrow_mut()))
    }

    #[async_trait::async_trait]
    impl ExchangePort for NullExchange {
        async fn get_balances(&self) -> Result<crate::types::Balances, crate::error::EngineError> {
            Ok(crate::types::Balances::default())
        }
        async fn list_open_orders(&self) -> Result<Vec<OpenOrder>, crate::error::EngineError> {
            Ok(Vec::new())
        }
        async fn cancel_order(&self, order_id: &str) -> Result<(), crate::error::EngineError> {
            CALLS.with(|c| c.borrow_mut().push(format!("cancel:{order_id}")));
            Ok(())
        }
        async fn place_limit_order(
            &self,
            side: Side,
            _asset_id: &str,
            price: f64,
            size: f64,
        ) -> Result<String, crate::error::EngineError> {
            CALLS.with(|c| c.borrow_mut().push(format!("place:{side}:{price}:{size}")));
            Ok("new-order".to_string())
        }
        async fn get_fills(&self, _since_ms: i64) -> Result<Vec<crate::types::Fill>, crate::error::EngineError> {
            Ok(Vec::new())
        }
    }
}
