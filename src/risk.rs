//! Streaming volatility/toxicity estimator and Kelly-style position sizing.
//!
//! One [`RiskEngine`] is created per market and fed a time-gated sample on
//! every tick of the warm-up/quote loop cadence (`on_time_sample`) plus a
//! markout update whenever the mid moves (`update_markouts`). Everything
//! here operates in logit space; `p`/`q` arguments are probabilities and
//! signed inventory respectively, converted internally.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::{MarketConfig, RiskConfig, WarmupConfig};
use crate::math::ewma::ewma_step;
use crate::math::numeric::{clip, logit_default};
use crate::types::Side;

const RETURN_HISTORY_CAPACITY: usize = 5000;
const PENDING_FILLS_CAPACITY: usize = 2000;

/// A fill awaiting its markout measurement at one or both horizons.
#[derive(Clone, Debug)]
struct PendingFill {
    side: Side,
    ts_ms: i64,
    x_fill: f64,
    h1_done: bool,
    h2_done: bool,
}

/// Snapshot written to `calib_path` once warm-up completes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub n_returns: usize,
    pub dt_sample_s: f64,
    pub sigma_base_logit_per_dt: f64,
    pub ema_fast_abs: f64,
    pub ema_slow_abs: f64,
}

/// Mutable EMA/toxicity state plus the returns/fills history it derives
/// from. Owned exclusively by the orchestrator's quote loop task.
pub struct RiskEngine {
    ema_fast_abs: f64,
    ema_slow_abs: f64,
    ema_fast_r: f64,
    ema_fast_abs_r: f64,
    ema_slow_abs_r: f64,
    tox_ema_pos_h1: f64,
    tox_ema_pos_h2: f64,
    sigma_smoothed: f64,
    last_sample_ts_ms: Option<i64>,
    last_x: f64,
    returns: VecDeque<f64>,
    fills_pending: VecDeque<PendingFill>,
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskEngine {
    pub fn new() -> Self {
        Self {
            ema_fast_abs: 0.0,
            ema_slow_abs: 0.0,
            ema_fast_r: 0.0,
            ema_fast_abs_r: 0.0,
            ema_slow_abs_r: 0.0,
            tox_ema_pos_h1: 0.0,
            tox_ema_pos_h2: 0.0,
            sigma_smoothed: 1.0,
            last_sample_ts_ms: None,
            last_x: 0.0,
            returns: VecDeque::with_capacity(RETURN_HISTORY_CAPACITY),
            fills_pending: VecDeque::with_capacity(PENDING_FILLS_CAPACITY),
        }
    }

    // ── time / Kelly sizing ──

    /// `(time-to-resolve / total-duration) ^ eta_time`, in `[0, 1]`.
    pub fn time_factor(&self, t_ms: i64, market: &MarketConfig, risk: &RiskConfig) -> f64 {
        let total_s = ((market.resolve_ts_ms - market.start_ts_ms).max(1)) as f64 / 1000.0;
        let remaining_s = ((market.resolve_ts_ms - t_ms).max(0)) as f64 / 1000.0;
        (remaining_s / total_s).powf(risk.eta_time)
    }

    /// Per-side bankroll allocation: half the bankroll split evenly across
    /// `n_plays` concurrent markets.
    pub fn b_side(&self, risk: &RiskConfig) -> f64 {
        let w = 1.0 / (risk.n_plays.max(1) as f64);
        0.5 * risk.bankroll_b * w
    }

    /// Maximum tolerable inventory at price `p`, current signed position
    /// `q`, and time `t_ms`.
    pub fn q_max(&self, p: f64, q: f64, t_ms: i64, market: &MarketConfig, risk: &RiskConfig) -> f64 {
        let p_opp = if q >= 0.0 { 1.0 - p } else { p };
        let denom = (p_opp * (1.0 + risk.slippage_buffer)).max(1e-9);
        (self.b_side(risk) * self.time_factor(t_ms, market, risk)) / denom
    }

    /// Normalized inventory in `[-1, 1]`.
    pub fn q_hat(&self, q: f64, p: f64, t_ms: i64, market: &MarketConfig, risk: &RiskConfig) -> f64 {
        let qm = self.q_max(p, q, t_ms, market, risk);
        if qm > 0.0 {
            clip(q / qm, -1.0, 1.0)
        } else {
            0.0
        }
    }

    /// Inventory-skew scaling factor, growing without bound (capped at
    /// `gamma_max`) as `|q_hat|` approaches 1.
    pub fn gamma(&self, q_hat: f64, risk: &RiskConfig) -> f64 {
        let u = clip(q_hat.abs(), 0.0, 0.999_999);
        let g = 1.0 / (1.0 - u).powf(risk.gamma_a);
        clip(g, 1.0, risk.gamma_max)
    }

    /// Probability-weighting factor: widest at `p=0.5`, narrowing toward
    /// the boundaries.
    fn a_p(p: f64, risk: &RiskConfig) -> f64 {
        let p = clip(p, 1e-6, 1.0 - 1e-6);
        let uncertainty = (p * (1.0 - p)) / 0.25;
        uncertainty.powf(risk.beta_p)
    }

    /// Liquidity factor: shrinks as the `U` proxy grows past `u_ref`.
    fn l_u(u: f64, risk: &RiskConfig) -> f64 {
        let u_ref = risk.u_ref.max(1e-9);
        (u_ref / (u + u_ref)).powf(risk.alpha_u)
    }

    /// Regime factor combining probability-weighting and liquidity,
    /// linearly interpolated between `lambda_min` and `lambda_max`.
    pub fn lambda_struct(&self, p: f64, u: f64, risk: &RiskConfig) -> f64 {
        let a = Self::a_p(p, risk);
        let l = Self::l_u(u, risk);
        let s = risk.w_a * (a - 1.0) + risk.w_l * (l - 1.0);
        let g = clip(s / risk.s_scale.max(1e-9), -1.0, 1.0);
        let lam = if g > 0.0 {
            1.0 + (risk.lambda_max - 1.0) * g
        } else {
            1.0 + (1.0 - risk.lambda_min) * g
        };
        clip(lam, risk.lambda_min, risk.lambda_max)
    }

    pub fn sigma(&self) -> f64 {
        self.sigma_smoothed
    }

    // ── markouts ──

    /// Measure adverse-selection markout at the two configured horizons
    /// for every pending fill that has aged into range, folding positive
    /// markout into the toxicity EMAs. Both horizons share `tau_fast_s` as
    /// their smoothing constant, matching the upstream calibration.
    pub fn update_markouts(&mut self, t_ms: i64, p_mid: f64, warmup: &WarmupConfig) {
        let x_now = logit_default(p_mid);
        let h1_ms = (warmup.markout_h1_s * 1000.0) as i64;
        let h2_ms = (warmup.markout_h2_s * 1000.0) as i64;

        let mut keep = VecDeque::with_capacity(self.fills_pending.len());
        while let Some(mut fill) = self.fills_pending.pop_front() {
            let x_fill = fill.x_fill;
            let s = match fill.side {
                Side::Buy => 1.0,
                Side::Sell => -1.0,
            };
            let age = t_ms - fill.ts_ms;
            if !fill.h1_done && age >= h1_ms {
                let mo = s * (x_now - x_fill);
                let pos = mo.max(0.0);
                self.tox_ema_pos_h1 =
                    ewma_step(self.tox_ema_pos_h1, pos, warmup.tau_fast_s, warmup.dt_sample_s);
                fill.h1_done = true;
            }
            if !fill.h2_done && age >= h2_ms {
                let mo = s * (x_now - x_fill);
                let pos = mo.max(0.0);
                self.tox_ema_pos_h2 =
                    ewma_step(self.tox_ema_pos_h2, pos, warmup.tau_fast_s, warmup.dt_sample_s);
                fill.h2_done = true;
            }
            if !(fill.h1_done && fill.h2_done) {
                keep.push_back(fill);
            }
        }
        self.fills_pending = keep;
    }

    /// Record a fill awaiting markout measurement, stamping its entry
    /// price in logit space immediately from the fill's own price.
    pub fn record_fill_priced(&mut self, side: Side, ts_ms: i64, price: f64) {
        if self.fills_pending.len() == PENDING_FILLS_CAPACITY {
            self.fills_pending.pop_front();
        }
        self.fills_pending.push_back(PendingFill {
            side,
            ts_ms,
            x_fill: logit_default(price),
            h1_done: false,
            h2_done: false,
        });
    }

    // ── volatility sampling ──

    /// Time-gated sample: called on every cadence tick, but only actually
    /// updates state once per `dt_sample_s`. Returns `true` if a sample was
    /// taken.
    pub fn on_time_sample(
        &mut self,
        t_ms: i64,
        p_mid: f64,
        trade_rate_per_s: f64,
        warmup: &WarmupConfig,
        risk: &RiskConfig,
    ) -> bool {
        let dt_s = warmup.dt_sample_s;
        let x = logit_default(p_mid);

        let last_ts = match self.last_sample_ts_ms {
            None => {
                self.last_sample_ts_ms = Some(t_ms);
                self.last_x = x;
                return false;
            }
            Some(ts) => ts,
        };
        if (t_ms - last_ts) < (dt_s * 1000.0) as i64 - 10 {
            return false;
        }

        let r = x - self.last_x;
        if self.returns.len() == RETURN_HISTORY_CAPACITY {
            self.returns.pop_front();
        }
        self.returns.push_back(r);
        self.last_sample_ts_ms = Some(t_ms);
        self.last_x = x;

        let abs_r = r.abs();
        self.ema_fast_abs = ewma_step(self.ema_fast_abs, abs_r, warmup.tau_fast_s, dt_s);
        self.ema_slow_abs = ewma_step(self.ema_slow_abs, abs_r, warmup.tau_slow_s, dt_s);
        self.ema_fast_r = ewma_step(self.ema_fast_r, r, warmup.tau_fast_s, dt_s);
        self.ema_fast_abs_r = ewma_step(self.ema_fast_abs_r, abs_r, warmup.tau_fast_s, dt_s);
        self.ema_slow_abs_r = ewma_step(self.ema_slow_abs_r, abs_r, warmup.tau_slow_s, dt_s);

        let i_factor = clip(trade_rate_per_s / risk.rate_ref_per_s.max(1e-9), 1.0, risk.i_max);
        let j = self.ema_fast_abs / self.ema_slow_abs.max(1e-9);
        let d = self.ema_fast_r.abs() / self.ema_fast_abs_r.max(1e-9);
        let s_sigma = j.max(1.0).ln().max(0.0) * clip(d, 0.0, 1.0) * i_factor;

        let t_tox = warmup.markout_w1 * self.tox_ema_pos_h1 + warmup.markout_w2 * self.tox_ema_pos_h2;
        let z_tox = t_tox / self.ema_slow_abs_r.max(1e-9);
        let s = s_sigma + risk.c_tox * z_tox;

        let sigma_raw = clip(1.0 + risk.c_sigma * s.powf(risk.nu_sigma), 1.0, risk.sigma_max);
        let tau = if sigma_raw > self.sigma_smoothed {
            risk.sigma_tau_up_s
        } else {
            risk.sigma_tau_down_s
        };
        self.sigma_smoothed = ewma_step(self.sigma_smoothed, sigma_raw, tau, dt_s);
        true
    }

    pub fn warm_ready(&self, warmup: &WarmupConfig) -> bool {
        self.returns.len() >= warmup.min_return_samples as usize
    }

    /// Robust (median + MAD) base-volatility estimate plus the raw EMAs,
    /// for persisting at the end of warm-up.
    pub fn warm_snapshot(&self, warmup: &WarmupConfig) -> CalibrationSnapshot {
        let mut sorted: Vec<f64> = self.returns.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = percentile_sorted(&sorted, 0.5);
        let mut abs_dev: Vec<f64> = sorted.iter().map(|r| (r - median).abs()).collect();
        abs_dev.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mad = percentile_sorted(&abs_dev, 0.5);

        CalibrationSnapshot {
            n_returns: self.returns.len(),
            dt_sample_s: warmup.dt_sample_s,
            sigma_base_logit_per_dt: 1.4826 * mad,
            ema_fast_abs: self.ema_fast_abs,
            ema_slow_abs: self.ema_slow_abs,
        }
    }
}

fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
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
            resolve_ts_ms: 3600_000,
            wss_url: String::new(),
        }
    }

    #[test]
    fn time_factor_decays_to_zero_at_resolution() {
        let eng = RiskEngine::new();
        let risk = RiskConfig::default();
        let m = market();
        let f0 = eng.time_factor(0, &m, &risk);
        let f_end = eng.time_factor(m.resolve_ts_ms, &m, &risk);
        assert!((f0 - 1.0).abs() < 1e-9);
        assert!((f_end - 0.0).abs() < 1e-9);
    }

    #[test]
    fn q_hat_clips_to_unit_interval() {
        let eng = RiskEngine::new();
        let risk = RiskConfig::default();
        let m = market();
        let qh = eng.q_hat(1_000_000.0, 0.5, 0, &m, &risk);
        assert!((qh - 1.0).abs() < 1e-9);
        let qh_neg = eng.q_hat(-1_000_000.0, 0.5, 0, &m, &risk);
        assert!((qh_neg + 1.0).abs() < 1e-9);
    }

    #[test]
    fn gamma_grows_with_inventory_and_is_capped() {
        let eng = RiskEngine::new();
        let risk = RiskConfig::default();
        let g_flat = eng.gamma(0.0, &risk);
        let g_full = eng.gamma(0.999_999, &risk);
        assert!((g_flat - 1.0).abs() < 1e-6);
        assert!(g_full <= risk.gamma_max);
        assert!(g_full > g_flat);
    }

    #[test]
    fn on_time_sample_requires_seed_then_gated_updates() {
        let mut eng = RiskEngine::new();
        let warmup = WarmupConfig::default();
        let risk = RiskConfig::default();
        assert!(!eng.on_time_sample(0, 0.5, 0.0, &warmup, &risk));
        // too soon
        assert!(!eng.on_time_sample(1000, 0.51, 0.0, &warmup, &risk));
        // past dt_sample_s (5s)
        assert!(eng.on_time_sample(5000, 0.52, 0.0, &warmup, &risk));
        assert_eq!(eng.returns.len(), 1);
    }

    #[test]
    fn sigma_starts_at_one_and_stays_bounded() {
        let mut eng = RiskEngine::new();
        let warmup = WarmupConfig::default();
        let risk = RiskConfig::default();
        assert!((eng.sigma() - 1.0).abs() < 1e-9);
        let mut t = 0i64;
        let mut p = 0.5;
        for _ in 0..50 {
            t += 5000;
            p = (p + 0.01).min(0.95);
            eng.on_time_sample(t, p, 1.0, &warmup, &risk);
        }
        assert!(eng.sigma() >= 1.0);
        assert!(eng.sigma() <= risk.sigma_max);
    }

    #[test]
    fn warm_ready_gates_on_sample_count() {
        let mut eng = RiskEngine::new();
        let mut warmup = WarmupConfig::default();
        warmup.min_return_samples = 2;
        assert!(!eng.warm_ready(&warmup));
        eng.on_time_sample(0, 0.5, 0.0, &warmup, &RiskConfig::default());
        eng.on_time_sample(5000, 0.5, 0.0, &warmup, &RiskConfig::default());
        eng.on_time_sample(10000, 0.5, 0.0, &warmup, &RiskConfig::default());
        assert!(eng.warm_ready(&warmup));
    }

    #[test]
    fn markouts_retire_fill_once_both_horizons_measured() {
        let mut eng = RiskEngine::new();
        let warmup = WarmupConfig::default();
        eng.record_fill_priced(Side::Buy, 0, 0.5);
        assert_eq!(eng.fills_pending.len(), 1);
        eng.update_markouts(5_000, 0.52, &warmup); // before h1 (10s)
        assert_eq!(eng.fills_pending.len(), 1);
        eng.update_markouts(11_000, 0.52, &warmup); // past h1, before h2 (60s)
        assert_eq!(eng.fills_pending.len(), 1);
        eng.update_markouts(61_000, 0.52, &warmup); // past both
        assert_eq!(eng.fills_pending.len(), 0);
    }
}
