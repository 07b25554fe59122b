mod book;
mod cli;
mod config;
mod error;
mod exchange;
mod ingestor;
mod ladder;
mod math;
mod orchestrator;
mod quoter;
mod reconciler;
mod risk;
mod telemetry;
mod types;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cli::Cli;
use config::Config;
use error::EngineError;
use exchange::{DryRunExchange, ExchangePort};
use types::Balances;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let exchange = match build_exchange(&config, cli.dry_run) {
        Ok(ex) => ex,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("╔══════════════════════════════════════════════════╗");
    eprintln!("║  Prediction-market maker");
    eprintln!("║  Market: {} | Dry run: {}", config.market.market, cli.dry_run);
    eprintln!("║  Bankroll: ${:.0} | n_plays: {}", config.risk.bankroll_b, config.risk.n_plays);
    eprintln!("║  Refresh: {:.1}s | Sample: {:.1}s", config.quote.refresh_s, config.warmup.dt_sample_s);
    eprintln!("╚══════════════════════════════════════════════════╝");

    match orchestrator::run(config, exchange).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Build the exchange port for this run. `--dry-run` always succeeds with
/// an in-memory paper exchange seeded from `bankroll_b`. Live trading
/// requires credentials in the environment; wiring an actual venue
/// adapter behind `ExchangePort` is outside this core's scope (see
/// `DESIGN.md`), so a live run fails fast with a clear error rather than
/// silently falling back to paper trading.
fn build_exchange(config: &Config, dry_run: bool) -> Result<Arc<dyn ExchangePort>, EngineError> {
    if dry_run {
        return Ok(Arc::new(DryRunExchange::new(Balances {
            yes: 0.0,
            no: 0.0,
            usdc: config.risk.bankroll_b,
        })));
    }

    let live_config = config.clone().with_env_secrets();
    live_config.require_credentials()?;
    Err(EngineError::Config(
        "live trading requires a venue-specific ExchangePort adapter; only --dry-run is wired into this build".to_string(),
    ))
}
