//! Reservation price and half-spread computation, plus the per-side
//! notional-impact filter applied after the ladder is built.

use crate::book::{BookState, TradeTimeline};
use crate::config::{MarketConfig, QuoteConfig, RiskConfig};
use crate::ladder;
use crate::math::numeric::{clip, logit_default};
use crate::risk::RiskEngine;
use crate::types::{DesiredOrder, DesiredQuote, QuoteMetrics, Side};

/// Liquidity-proxy lookback: trades over the last 6 hours, used as
/// `U = sqrt(n_trades)` in the regime factor.
const U_PROXY_WINDOW_S: f64 = 6.0 * 3600.0;

pub struct Quoter;

impl Quoter {
    /// Compute the full desired quote (ladder on both sides, after the
    /// per-side notional-impact cap) for the current book/inventory state.
    pub fn compute(
        book: &BookState,
        trades: &TradeTimeline,
        risk_engine: &RiskEngine,
        q_yes: f64,
        now_ms: i64,
        market: &MarketConfig,
        risk: &RiskConfig,
        quote: &QuoteConfig,
    ) -> DesiredQuote {
        let p = clip(book.mid, 1e-6, 1.0 - 1e-6);

        let q_hat = risk_engine.q_hat(q_yes, p, now_ms, market, risk);
        let gamma = risk_engine.gamma(q_hat, risk);
        let u_proxy = Self::estimate_u_proxy(trades, now_ms);
        let lambda = risk_engine.lambda_struct(p, u_proxy, risk);
        let sigma = risk_engine.sigma();

        let delta = q_hat * gamma * lambda * sigma;
        let m = logit_default(p);
        let reservation_logit = m - delta;

        let half_spread_risk = quote.c_risk * gamma * lambda * sigma;

        let trade_rate = trades.rate_per_s(now_ms, 60.0);
        let kappa_scale = 1.0 + (trade_rate / risk.rate_ref_per_s.max(1e-9));
        let kappa = quote.kappa0 * kappa_scale;
        let half_spread_liquidity = (1.0 / gamma) * (1.0 + gamma / kappa.max(1e-9)).ln();

        let half_spread = clip(
            half_spread_risk + half_spread_liquidity,
            0.0,
            quote.max_half_spread_logit,
        );

        let b_side_effective = risk_engine.b_side(risk) * risk_engine.time_factor(now_ms, market, risk);

        let raw = ladder::build_ladder(&ladder::LadderInput {
            reservation_logit,
            half_bid: half_spread,
            half_ask: half_spread,
            tick_size: book.tick_size,
            b_side: b_side_effective,
            decay: quote.ladder_decay,
            step_mult: quote.ladder_step_mult,
            min_step_logit: quote.ladder_min_step_logit,
            max_levels: quote.ladder_max_levels,
        });

        let bids = Self::clean_orders(raw.bids, Side::Buy, quote);
        let asks = Self::clean_orders(raw.asks, Side::Sell, quote);

        DesiredQuote {
            metrics: QuoteMetrics {
                mid: book.mid,
                q_hat,
                gamma,
                lambda,
                sigma,
                reservation_logit,
                half_spread_risk,
                half_spread_liquidity,
                half_spread,
                u_proxy,
                b_side: b_side_effective,
            },
            bids,
            asks,
        }
    }

    fn estimate_u_proxy(trades: &TradeTimeline, now_ms: i64) -> f64 {
        let n = trades.rate_per_s(now_ms, U_PROXY_WINDOW_S) * U_PROXY_WINDOW_S;
        n.max(0.0).sqrt()
    }

    /// Enforce `min_order_size` and stop adding levels once the cumulative
    /// notional exposure on this side would exceed `max_order_notional_side`.
    fn clean_orders(raw: Vec<DesiredOrder>, side: Side, quote: &QuoteConfig) -> Vec<DesiredOrder> {
        let mut total_notional = 0.0;
        let mut out = Vec::with_capacity(raw.len());
        for mut order in raw {
            order.size = order.size.max(quote.min_order_size);
            let notional_impact = match side {
                Side::Buy => order.price * order.size,
                Side::Sell => (1.0 - order.price) * order.size,
            };
            if total_notional + notional_impact > quote.max_order_notional_side {
                break;
            }
            total_notional += notional_impact;
            out.push(order);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> MarketConfig {
        MarketConfig {
            market: "test".to_string(),
            asset_id_yes: "yes".to_string(),
            asset_id_no: "no".to_string(),
            start_ts_ms: 0,
            resolve_ts_ms: 3_600_000,
            wss_url: String::new(),
        }
    }

    #[test]
    fn compute_produces_symmetric_ladder_at_neutral_inventory() {
        let mut book = BookState::default();
        book.apply_book(Some(0.48), Some(0.52), 0);
        let trades = TradeTimeline::new();
        let risk_engine = RiskEngine::new();
        let market = market();
        let risk = RiskConfig::default();
        let quote = QuoteConfig::default();

        let dq = Quoter::compute(&book, &trades, &risk_engine, 0.0, 0, &market, &risk, &quote);
        assert!(!dq.bids.is_empty());
        assert!(!dq.asks.is_empty());
        assert!(dq.metrics.q_hat.abs() < 1e-9);
    }

    #[test]
    fn clean_orders_stops_at_notional_cap() {
        let mut quote = QuoteConfig::default();
        quote.max_order_notional_side = 10.0;
        quote.min_order_size = 1.0;
        let raw = vec![
            DesiredOrder { level: 0, side: Side::Buy, price: 0.5, size: 8.0 },
            DesiredOrder { level: 1, side: Side::Buy, price: 0.49, size: 8.0 },
        ];
        let cleaned = Quoter::clean_orders(raw, Side::Buy, &quote);
        assert_eq!(cleaned.len(), 1);
    }
}
