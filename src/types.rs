//! Domain types shared across the book, risk engine, quoter, ladder
//! builder, reconciler, and exchange port.

use serde::{Deserialize, Serialize};

/// Which side of the book an order sits on. `Buy` accumulates YES shares,
/// `Sell` accumulates NO exposure (equivalently, sells YES).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Only GTC limit orders are supported — see the exchange port Non-goals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Gtc,
}

/// A single rung of the ladder the quoter wants resting on the book.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DesiredOrder {
    pub level: u32,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// An order currently resting on the venue, as reported by
/// `ExchangePort::list_open_orders`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub asset_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub size_remaining: f64,
}

/// Outcome of submitting an order to the venue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum OrderStatus {
    Live,
    Filled,
    PartiallyFilled,
    Unmatched,
    Rejected(String),
}

/// A fill reported by `ExchangePort::get_fills`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fill {
    pub ts_ms: i64,
    pub order_id: String,
    pub asset_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// Account balances keyed by outcome token label ("YES"/"NO") plus
/// collateral ("USDC"). Only the YES balance drives `q_yes` in the risk
/// engine; the rest is carried for completeness/telemetry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Balances {
    pub yes: f64,
    pub no: f64,
    pub usdc: f64,
}

/// One ladder side's worth of desired orders plus the metrics the quoter
/// computed to produce them, for telemetry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuoteMetrics {
    pub mid: f64,
    pub q_hat: f64,
    pub gamma: f64,
    pub lambda: f64,
    pub sigma: f64,
    pub reservation_logit: f64,
    pub half_spread_risk: f64,
    pub half_spread_liquidity: f64,
    pub half_spread: f64,
    pub u_proxy: f64,
    pub b_side: f64,
}

/// Full output of one quote computation: the metrics plus both ladder sides.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DesiredQuote {
    pub metrics: QuoteMetrics,
    pub bids: Vec<DesiredOrder>,
    pub asks: Vec<DesiredOrder>,
}
