//! Top-of-book state and the recent-trade timeline used for trade-rate
//! estimation. Owned exclusively by the stream ingestor task.

use std::collections::VecDeque;

const TRADE_TIMELINE_CAPACITY: usize = 5000;

/// Best bid/ask, derived mid, and the venue's current tick size.
#[derive(Clone, Debug)]
pub struct BookState {
    pub best_bid: f64,
    pub best_ask: f64,
    pub mid: f64,
    pub tick_size: f64,
    pub last_trade_price: Option<f64>,
    pub last_book_ts_ms: i64,
    pub last_trade_ts_ms: i64,
}

impl Default for BookState {
    fn default() -> Self {
        Self {
            best_bid: 0.0,
            best_ask: 1.0,
            mid: 0.5,
            tick_size: 0.01,
            last_trade_price: None,
            last_book_ts_ms: 0,
            last_trade_ts_ms: 0,
        }
    }
}

impl BookState {
    /// The mid is only meaningful once both sides are inside (0, 1) and
    /// the book isn't crossed. Until then it stays at its previous value.
    fn refresh_mid(&mut self) {
        let (b, a) = (self.best_bid, self.best_ask);
        if b > 0.0 && a < 1.0 && b < a {
            self.mid = 0.5 * (b + a);
        }
    }

    /// Whether the current mid can be trusted (book has two-sided depth).
    pub fn is_valid(&self) -> bool {
        self.best_bid > 0.0 && self.best_ask < 1.0 && self.best_bid < self.best_ask
    }

    pub fn apply_book(&mut self, best_bid: Option<f64>, best_ask: Option<f64>, ts_ms: i64) {
        if let Some(b) = best_bid {
            self.best_bid = b;
        }
        if let Some(a) = best_ask {
            self.best_ask = a;
        }
        self.last_book_ts_ms = ts_ms;
        self.refresh_mid();
    }

    pub fn apply_tick_size(&mut self, tick_size: f64) {
        self.tick_size = tick_size;
    }

    pub fn apply_trade(&mut self, price: f64, ts_ms: i64) {
        self.last_trade_price = Some(price);
        self.last_trade_ts_ms = ts_ms;
    }
}

/// Bounded FIFO of recent trade timestamps, used to estimate trade
/// intensity. Capacity-capped so a busy market can't grow memory without
/// bound.
#[derive(Debug)]
pub struct TradeTimeline {
    ts: VecDeque<i64>,
}

impl Default for TradeTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TradeTimeline {
    pub fn new() -> Self {
        Self {
            ts: VecDeque::with_capacity(TRADE_TIMELINE_CAPACITY),
        }
    }

    pub fn push(&mut self, ts_ms: i64) {
        if self.ts.len() == TRADE_TIMELINE_CAPACITY {
            self.ts.pop_front();
        }
        self.ts.push_back(ts_ms);
    }

    /// Trades-per-second over the trailing `window_s` seconds, counted by
    /// scanning back from the newest entry until one falls outside the
    /// window.
    pub fn rate_per_s(&self, now_ms: i64, window_s: f64) -> f64 {
        if self.ts.is_empty() {
            return 0.0;
        }
        let cutoff = now_ms - (window_s * 1000.0) as i64;
        let mut n = 0u32;
        for &ts in self.ts.iter().rev() {
            if ts < cutoff {
                break;
            }
            n += 1;
        }
        n as f64 / window_s.max(1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_stays_invalid_until_two_sided() {
        let mut b = BookState::default();
        assert!(!b.is_valid());
        b.apply_book(Some(0.4), None, 1);
        assert!(!b.is_valid());
        b.apply_book(None, Some(0.6), 2);
        assert!(b.is_valid());
        assert!((b.mid - 0.5).abs() < 1e-9);
    }

    #[test]
    fn crossed_book_does_not_update_mid() {
        let mut b = BookState::default();
        b.apply_book(Some(0.4), Some(0.6), 1);
        let mid_before = b.mid;
        b.apply_book(Some(0.7), None, 2); // now crossed: bid 0.7 > ask 0.6
        assert_eq!(b.mid, mid_before);
    }

    #[test]
    fn trade_rate_counts_only_within_window() {
        let mut t = TradeTimeline::new();
        for ts in [0, 1000, 2000, 61_000] {
            t.push(ts);
        }
        // window ends at 61_000; 60s window covers [1000, 61000]
        let rate = t.rate_per_s(61_000, 60.0);
        assert!((rate - (3.0 / 60.0)).abs() < 1e-9, "rate={}", rate);
    }

    #[test]
    fn trade_timeline_caps_capacity() {
        let mut t = TradeTimeline::new();
        for i in 0..(TRADE_TIMELINE_CAPACITY + 10) {
            t.push(i as i64);
        }
        assert_eq!(t.ts.len(), TRADE_TIMELINE_CAPACITY);
        assert_eq!(*t.ts.front().unwrap(), 10);
    }
}
