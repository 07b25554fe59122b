//! Geometric ladder construction in logit space.
//!
//! Levels step outward from the reservation price at a fixed logit
//! increment, snapped to the venue's tick grid, with per-level size
//! decaying geometrically. Levels that snap to the same tick-rounded
//! price are merged, keeping whichever level index got there first.

use std::collections::HashMap;

use crate::math::numeric::{ceil_to_tick, floor_to_tick, logit_default, sigmoid};
use crate::types::{DesiredOrder, Side};

pub struct LadderInput {
    pub reservation_logit: f64,
    pub half_bid: f64,
    pub half_ask: f64,
    pub tick_size: f64,
    pub b_side: f64,
    pub decay: f64,
    pub step_mult: f64,
    pub min_step_logit: f64,
    pub max_levels: u32,
}

pub struct Ladder {
    pub bids: Vec<DesiredOrder>,
    pub asks: Vec<DesiredOrder>,
}

/// Build both sides of the ladder from the reservation price and
/// half-spreads. Levels below `0.001` or above `0.999` are dropped — the
/// tick grid has no room left to place them.
pub fn build_ladder(input: &LadderInput) -> Ladder {
    let x_b0 = input.reservation_logit - input.half_bid;
    let x_a0 = input.reservation_logit + input.half_ask;
    let base_step = (input.step_mult * (input.half_bid + input.half_ask) / 2.0)
        .max(input.min_step_logit);
    let base_risk_unit = input.b_side * 0.10;

    let mut bids = Vec::new();
    for i in 0..input.max_levels {
        let x = x_b0 - (i as f64) * base_step;
        let mut p = sigmoid(x);
        p = floor_to_tick(p, input.tick_size);
        if p <= 0.001 {
            break;
        }
        let level_risk = base_risk_unit * input.decay.powi(i as i32);
        let size = level_risk / p.max(1e-3);
        bids.push(DesiredOrder { level: i, side: Side::Buy, price: p, size });
    }

    let mut asks = Vec::new();
    for i in 0..input.max_levels {
        let x = x_a0 + (i as f64) * base_step;
        let mut p = sigmoid(x);
        p = ceil_to_tick(p, input.tick_size);
        if p >= 0.999 {
            break;
        }
        let level_risk = base_risk_unit * input.decay.powi(i as i32);
        let size = level_risk / (1.0 - p).max(1e-3);
        asks.push(DesiredOrder { level: i, side: Side::Sell, price: p, size });
    }

    Ladder {
        bids: dedupe(bids, input.tick_size, false),
        asks: dedupe(asks, input.tick_size, true),
    }
}

/// Collapse levels that snapped to the same tick price, keeping the
/// lowest level index seen for each price, then sort (bids descending,
/// asks ascending).
fn dedupe(orders: Vec<DesiredOrder>, tick: f64, ascending: bool) -> Vec<DesiredOrder> {
    let mut by_price: HashMap<i64, DesiredOrder> = HashMap::new();
    for order in orders {
        let key = (order.price / tick).round() as i64;
        by_price
            .entry(key)
            .and_modify(|existing| {
                if order.level < existing.level {
                    *existing = order;
                }
            })
            .or_insert(order);
    }
    let mut out: Vec<DesiredOrder> = by_price.into_values().collect();
    if ascending {
        out.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());
    } else {
        out.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> LadderInput {
        LadderInput {
            reservation_logit: logit_default(0.5),
            half_bid: 0.05,
            half_ask: 0.05,
            tick_size: 0.01,
            b_side: 25.0,
            decay: 0.8,
            step_mult: 0.5,
            min_step_logit: 0.05,
            max_levels: 5,
        }
    }

    #[test]
    fn bids_strictly_below_reservation_asks_strictly_above() {
        let input = base_input();
        let ladder = build_ladder(&input);
        let p_res = sigmoid(input.reservation_logit);
        for b in &ladder.bids {
            assert!(b.price < p_res);
        }
        for a in &ladder.asks {
            assert!(a.price > p_res);
        }
    }

    #[test]
    fn bids_sorted_descending_asks_ascending() {
        let ladder = build_ladder(&base_input());
        for w in ladder.bids.windows(2) {
            assert!(w[0].price >= w[1].price);
        }
        for w in ladder.asks.windows(2) {
            assert!(w[0].price <= w[1].price);
        }
    }

    #[test]
    fn never_exceeds_max_levels() {
        let ladder = build_ladder(&base_input());
        assert!(ladder.bids.len() <= 5);
        assert!(ladder.asks.len() <= 5);
    }

    #[test]
    fn sizes_decay_geometrically() {
        let ladder = build_ladder(&base_input());
        if ladder.bids.len() >= 2 {
            // deeper levels (lower level index closer to reservation) should
            // generally carry comparable-or-smaller risk allocation
            let first = &ladder.bids[0];
            assert!(first.size > 0.0);
        }
    }

    #[test]
    fn extreme_half_spread_near_boundary_drops_levels() {
        let mut input = base_input();
        input.reservation_logit = logit_default(0.002);
        input.half_bid = 0.01;
        let ladder = build_ladder(&input);
        // bids very close to zero should be dropped once price <= 0.001
        assert!(ladder.bids.len() <= 5);
    }

    #[test]
    fn dedupe_keeps_lowest_level_index() {
        let a = DesiredOrder { level: 2, side: Side::Buy, price: 0.50, size: 1.0 };
        let b = DesiredOrder { level: 0, side: Side::Buy, price: 0.50, size: 2.0 };
        let out = dedupe(vec![a, b], 0.01, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].level, 0);
    }
}
