//! Configuration: structural parameters load from a JSON file, secrets load
//! from the environment. Keeping the two separate means a config file can
//! be checked into a deploy repo without ever containing a private key.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Warm-up sampler parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub dt_sample_s: f64,
    pub min_return_samples: u32,
    pub max_warmup_s: f64,
    pub tau_fast_s: f64,
    pub tau_slow_s: f64,
    pub markout_h1_s: f64,
    pub markout_h2_s: f64,
    pub markout_w1: f64,
    pub markout_w2: f64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            dt_sample_s: 5.0,
            min_return_samples: 360,
            max_warmup_s: 7200.0,
            tau_fast_s: 30.0,
            tau_slow_s: 1800.0,
            markout_h1_s: 10.0,
            markout_h2_s: 60.0,
            markout_w1: 0.6,
            markout_w2: 0.4,
        }
    }
}

/// Risk/Kelly-sizing parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub bankroll_b: f64,
    pub n_plays: u32,
    pub eta_time: f64,
    pub slippage_buffer: f64,
    pub gamma_a: f64,
    pub gamma_max: f64,
    pub lambda_min: f64,
    pub lambda_max: f64,
    pub beta_p: f64,
    pub alpha_u: f64,
    pub u_ref: f64,
    pub w_a: f64,
    pub w_l: f64,
    pub s_scale: f64,
    pub i_max: f64,
    pub c_tox: f64,
    pub c_sigma: f64,
    pub nu_sigma: f64,
    pub sigma_max: f64,
    pub sigma_tau_up_s: f64,
    pub sigma_tau_down_s: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            bankroll_b: 50.0,
            n_plays: 3,
            eta_time: 0.5,
            slippage_buffer: 0.10,
            gamma_a: 1.0,
            gamma_max: 50.0,
            lambda_min: 0.8,
            lambda_max: 2.0,
            beta_p: 0.7,
            alpha_u: 0.5,
            u_ref: 50.0,
            w_a: 1.0,
            w_l: 1.0,
            s_scale: 1.0,
            i_max: 3.0,
            c_tox: 1.0,
            c_sigma: 1.0,
            nu_sigma: 1.4,
            sigma_max: 6.0,
            sigma_tau_up_s: 10.0,
            sigma_tau_down_s: 90.0,
        }
    }
}

/// Quoting / ladder parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    pub c_risk: f64,
    pub kappa0: f64,
    pub rate_ref_per_s: f64,
    pub min_half_spread_prob: f64,
    pub max_half_spread_logit: f64,
    pub ladder_decay: f64,
    pub ladder_step_mult: f64,
    pub ladder_min_step_logit: f64,
    pub ladder_max_levels: u32,
    pub min_order_size: f64,
    pub max_order_notional_side: f64,
    pub refresh_s: f64,
    pub price_move_requote_ticks: u32,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            c_risk: 0.2,
            kappa0: 1.0,
            rate_ref_per_s: 0.05,
            min_half_spread_prob: 0.01,
            max_half_spread_logit: 1.5,
            ladder_decay: 0.8,
            ladder_step_mult: 0.5,
            ladder_min_step_logit: 0.05,
            ladder_max_levels: 5,
            min_order_size: 1.0,
            max_order_notional_side: 100.0,
            refresh_s: 2.0,
            price_move_requote_ticks: 1,
        }
    }
}

/// The market this instance quotes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketConfig {
    pub market: String,
    pub asset_id_yes: String,
    pub asset_id_no: String,
    pub start_ts_ms: i64,
    pub resolve_ts_ms: i64,
    #[serde(default = "default_wss_url")]
    pub wss_url: String,
}

fn default_wss_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

/// Logging verbosity and feature toggles.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub enable_performance: bool,
    pub enable_context_tracking: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            enable_performance: false,
            enable_context_tracking: false,
        }
    }
}

fn default_log_path() -> String {
    "./data/logs/mm_events.jsonl".to_string()
}

fn default_calib_path() -> String {
    "./data/calibration/warm_calibration.json".to_string()
}

/// Top-level configuration, loaded from a JSON file at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub market: MarketConfig,
    #[serde(default)]
    pub warmup: WarmupConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_log_path")]
    pub log_path: String,
    #[serde(default = "default_calib_path")]
    pub calib_path: String,

    /// Secrets, never present in the file — populated by `load_secrets`.
    #[serde(skip)]
    pub secrets: Secrets,
}

/// Credentials read from the environment, never from the config file.
#[derive(Clone, Debug, Default)]
pub struct Secrets {
    pub polymarket_private_key: Option<String>,
    pub polymarket_funder_address: Option<String>,
    /// 0 = EOA, 1 = Proxy, 2 = Gnosis Safe, matching the CLOB signer's
    /// `SignatureType` enum.
    pub polymarket_signature_type: u8,
}

impl Config {
    /// Read and parse the structural config file. Does not touch the
    /// environment — call [`Config::with_env_secrets`] afterward in live mode.
    pub fn load(path: &Path) -> Result<Config, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("reading {}: {}", path.display(), e)))?;
        let mut cfg: Config = serde_json::from_str(&text)
            .map_err(|e| EngineError::Config(format!("parsing {}: {}", path.display(), e)))?;
        cfg.secrets = Secrets::default();
        Ok(cfg)
    }

    /// Populate `secrets` from the environment. Required before running in
    /// live (non-dry-run) mode; never required for dry-run.
    pub fn with_env_secrets(mut self) -> Self {
        self.secrets = Secrets {
            polymarket_private_key: std::env::var("POLYMARKET_PRIVATE_KEY").ok(),
            polymarket_funder_address: std::env::var("POLYMARKET_FUNDER_ADDRESS").ok(),
            polymarket_signature_type: std::env::var("POLYMARKET_SIGNATURE_TYPE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        };
        self
    }

    /// Require a private key to be present, for live-mode startup.
    pub fn require_credentials(&self) -> Result<(), EngineError> {
        if self.secrets.polymarket_private_key.is_none() {
            return Err(EngineError::Credential(
                "POLYMARKET_PRIVATE_KEY is required outside dry-run mode".to_string(),
            ));
        }
        Ok(())
    }
}
