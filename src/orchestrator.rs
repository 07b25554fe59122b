//! Warm-up, quote loop, fill poller, and graceful shutdown.
//!
//! Four cooperating tasks share three single-writer cells — [`BookState`]
//! (written only by the ingestor), [`TradeTimeline`] (written only by the
//! ingestor), and [`RiskEngine`] (written only by the sampler and fill
//! poller) — each guarded by a `tokio::sync::Mutex` held no longer than it
//! takes to read or mutate the cell. The quote loop only ever reads.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{watch, Mutex};

use crate::book::{BookState, TradeTimeline};
use crate::config::Config;
use crate::error::EngineError;
use crate::exchange::ExchangePort;
use crate::ingestor;
use crate::quoter::Quoter;
use crate::reconciler;
use crate::risk::RiskEngine;
use crate::telemetry::{self, EventLogger};

const WARMUP_POLL_MS: u64 = 200;
const FILL_POLL_INTERVAL_S: u64 = 2;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Run the market maker end to end: spawn the ingestor and sampler, block
/// on warm-up, spawn the fill poller and quote loop, then wait for a
/// shutdown signal (Ctrl-C). Each task is signalled via the shared
/// `shutdown` watch and exits at its own next yield point — in-flight
/// venue calls are allowed to finish rather than being force-killed, so
/// shutdown joins every task instead of aborting it. Only a fatal
/// startup failure (e.g. can't open the log file) returns an `Err`.
pub async fn run(config: Config, exchange: Arc<dyn ExchangePort>) -> Result<(), EngineError> {
    let logger = Arc::new(Mutex::new(EventLogger::open(std::path::Path::new(&config.log_path))?));
    let book = Arc::new(Mutex::new(BookState::default()));
    let trades = Arc::new(Mutex::new(TradeTimeline::new()));
    let risk_engine = Arc::new(Mutex::new(RiskEngine::new()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingestor_handle = tokio::spawn(ingestor::run(
        config.market.clone(),
        shutdown_rx.clone(),
        book.clone(),
        trades.clone(),
        logger.clone(),
    ));

    let sampler_handle = tokio::spawn(sampler_task(
        config.clone(),
        shutdown_rx.clone(),
        book.clone(),
        trades.clone(),
        risk_engine.clone(),
    ));

    logger.lock().await.write(
        "warmup_start",
        json!({"dt_sample_s": config.warmup.dt_sample_s, "min_samples": config.warmup.min_return_samples}),
    );
    warm_up(&config, &shutdown_rx, &risk_engine, &logger).await;

    let fill_poller_handle = tokio::spawn(fill_poller_task(
        shutdown_rx.clone(),
        exchange.clone(),
        risk_engine.clone(),
        logger.clone(),
    ));

    let quote_loop_handle = tokio::spawn(quote_loop(
        config.clone(),
        shutdown_rx.clone(),
        book.clone(),
        trades.clone(),
        risk_engine.clone(),
        exchange.clone(),
        logger.clone(),
    ));

    // Ctrl-C flips the shared flag once; every task observes it at its own
    // next yield and winds down on its own.
    let _ = tokio::signal::ctrl_c().await;
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(ingestor_handle, sampler_handle, fill_poller_handle, quote_loop_handle);

    logger.lock().await.write("shutdown", json!({}));
    Ok(())
}

/// Periodic volatility/toxicity sampler — runs for the life of the
/// process at `dt_sample_s` cadence, independent of the (typically
/// faster) quote-loop cadence. A tick is skipped whenever the book has
/// no valid mid yet.
async fn sampler_task(
    config: Config,
    mut shutdown: watch::Receiver<bool>,
    book: Arc<Mutex<BookState>>,
    trades: Arc<Mutex<TradeTimeline>>,
    risk_engine: Arc<Mutex<RiskEngine>>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(
        (config.warmup.dt_sample_s * 1000.0) as u64,
    ));
    loop {
        tokio::select! {
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
            _ = interval.tick() => {
                let (mid, valid) = {
                    let b = book.lock().await;
                    (b.mid, b.is_valid())
                };
                if !valid {
                    continue;
                }
                let t = now_ms();
                let rate = trades.lock().await.rate_per_s(t, 60.0);
                let mut eng = risk_engine.lock().await;
                eng.on_time_sample(t, mid, rate, &config.warmup, &config.risk);
                eng.update_markouts(t, mid, &config.warmup);
            }
        }
    }
}

/// Block until the risk engine reports ready, the warm-up time budget is
/// exhausted, or shutdown fires. Persists the calibration snapshot either
/// way — a short-lived process that never sees enough samples still
/// leaves a usable (if noisy) snapshot behind.
async fn warm_up(
    config: &Config,
    shutdown: &watch::Receiver<bool>,
    risk_engine: &Arc<Mutex<RiskEngine>>,
    logger: &Arc<Mutex<EventLogger>>,
) {
    let start = std::time::Instant::now();
    loop {
        if *shutdown.borrow() {
            break;
        }
        if risk_engine.lock().await.warm_ready(&config.warmup) {
            break;
        }
        if start.elapsed().as_secs_f64() >= config.warmup.max_warmup_s {
            break;
        }
        tokio::time::sleep(Duration::from_millis(WARMUP_POLL_MS)).await;
    }

    let snapshot = risk_engine.lock().await.warm_snapshot(&config.warmup);
    if let Err(e) = telemetry::write_calibration_snapshot(
        std::path::Path::new(&config.calib_path),
        &snapshot,
    ) {
        logger.lock().await.log_error("warmup_persist_snapshot", &e, json!({}));
    }
    logger
        .lock()
        .await
        .write_typed("warmup_done", &snapshot);
}

/// Every 2s, ask the exchange for fills newer than the last-seen
/// timestamp and hand them to the risk engine's markout tracker,
/// advancing the watermark to the max timestamp observed.
async fn fill_poller_task(
    mut shutdown: watch::Receiver<bool>,
    exchange: Arc<dyn ExchangePort>,
    risk_engine: Arc<Mutex<RiskEngine>>,
    logger: Arc<Mutex<EventLogger>>,
) {
    let mut last_poll_ms = now_ms() - 60_000;
    let mut interval = tokio::time::interval(Duration::from_secs(FILL_POLL_INTERVAL_S));
    loop {
        tokio::select! {
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } }
            _ = interval.tick() => {
                match exchange.get_fills(last_poll_ms).await {
                    Ok(fills) => {
                        if fills.is_empty() {
                            continue;
                        }
                        let mut eng = risk_engine.lock().await;
                        let mut max_ts = last_poll_ms;
                        for f in &fills {
                            eng.record_fill_priced(f.side, f.ts_ms, f.price);
                            max_ts = max_ts.max(f.ts_ms);
                        }
                        drop(eng);
                        last_poll_ms = max_ts;
                    }
                    Err(e) => {
                        logger.lock().await.log_error(
                            "poll_fills",
                            &e,
                            json!({"last_poll_ms": last_poll_ms}),
                        );
                    }
                }
            }
        }
    }
}

/// Compute a quote and reconcile it against the venue every `refresh_s`,
/// printing a status line at most once every 5s. A quote cycle is skipped
/// (not an error) whenever the mid is outside `(0, 1)`.
async fn quote_loop(
    config: Config,
    mut shutdown: watch::Receiver<bool>,
    book: Arc<Mutex<BookState>>,
    trades: Arc<Mutex<TradeTimeline>>,
    risk_engine: Arc<Mutex<RiskEngine>>,
    exchange: Arc<dyn ExchangePort>,
    logger: Arc<Mutex<EventLogger>>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(
        (config.quote.refresh_s * 1000.0) as u64,
    ));
    let mut last_print = std::time::Instant::now() - Duration::from_secs(10);

    loop {
        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = shutdown.changed() => { if *shutdown.borrow() { return; } continue; }
            _ = interval.tick() => {}
        }

        let (book_snapshot, valid) = {
            let b = book.lock().await;
            (b.clone(), b.is_valid())
        };
        if !valid || !(0.0..1.0).contains(&book_snapshot.mid) {
            continue;
        }

        let balances = match exchange.get_balances().await {
            Ok(b) => b,
            Err(e) => {
                logger.lock().await.log_error("quote_loop_get_balances", &e, json!({}));
                continue;
            }
        };

        let now = now_ms();
        let desired = {
            let trades_guard = trades.lock().await;
            let risk_guard = risk_engine.lock().await;
            Quoter::compute(
                &book_snapshot,
                &trades_guard,
                &risk_guard,
                balances.yes,
                now,
                &config.market,
                &config.risk,
                &config.quote,
            )
        };

        if last_print.elapsed().as_secs_f64() > 5.0 {
            println!(
                "[{}] mid={:.3} q={:.1} sigma={:.2} r_logit={:.3} | bids={} asks={}",
                chrono::Utc::now().to_rfc3339(),
                desired.metrics.mid,
                balances.yes,
                desired.metrics.sigma,
                desired.metrics.reservation_logit,
                desired.bids.len(),
                desired.asks.len(),
            );
            last_print = std::time::Instant::now();
        }

        let mut log = logger.lock().await;
        log.write_typed("quote_computed", &desired);
        drop(log);

        reconciler::reconcile(
            exchange.as_ref(),
            &mut *logger.lock().await,
            &config.market.asset_id_yes,
            &desired.bids,
            &desired.asks,
        )
        .await;
    }
}
