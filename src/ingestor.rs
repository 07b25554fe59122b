//! Venue stream ingestor.
//!
//! Connects to the market's websocket feed, subscribes, and dispatches each
//! frame into the shared [`BookState`]/[`TradeTimeline`]. This task is the
//! sole mutator of both — every other task only ever reads a locked
//! snapshot. Frame parsing is tolerant of the venue's duck-typed field
//! synonyms (`bids`/`buys`, `asks`/`sells`) and never fails a whole batch
//! over one bad field; an unparsable frame is logged and dropped, a
//! connection drop triggers reconnect with capped exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::book::{BookState, TradeTimeline};
use crate::config::MarketConfig;
use crate::telemetry::EventLogger;

const PING_INTERVAL_S: u64 = 15;
const BACKOFF_START_MS: u64 = 1000;
const BACKOFF_MAX_MS: u64 = 10_000;

/// One parsed venue frame. `Unknown` only carries the tag, for logging.
#[derive(Debug)]
enum Frame {
    Book { best_bid: Option<f64>, best_ask: Option<f64>, ts_ms: i64 },
    PriceChange { best_bid: Option<f64>, best_ask: Option<f64>, ts_ms: i64, n_changes: usize },
    TickSizeChange { tick_size: f64 },
    LastTrade { price: f64, ts_ms: i64, side: String },
    Unknown { event_type: String },
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Accept a price as either a JSON number or a numeric string, and reject
/// anything non-finite — the two shapes the venue is known to emit.
fn parse_price_field(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

fn top_of_book_price(levels: &Value) -> Option<f64> {
    levels.as_array()?.first()?.get("price").and_then(parse_price_field)
}

/// Parse one raw text frame. `None` means the payload wasn't JSON or
/// carried no recognizable `event_type`/`type` tag at all — the caller
/// logs a parse error and reads the next frame.
fn parse_frame(raw: &str) -> Option<Frame> {
    let v: Value = serde_json::from_str(raw).ok()?;
    let event_type = v
        .get("event_type")
        .or_else(|| v.get("type"))
        .and_then(|t| t.as_str())?;
    let ts_ms = v.get("timestamp").and_then(|t| t.as_i64()).unwrap_or_else(now_ms);

    Some(match event_type {
        "book" => {
            let bids = v.get("bids").or_else(|| v.get("buys"));
            let asks = v.get("asks").or_else(|| v.get("sells"));
            Frame::Book {
                best_bid: bids.and_then(top_of_book_price),
                best_ask: asks.and_then(top_of_book_price),
                ts_ms,
            }
        }
        "price_change" => {
            let changes: Vec<Value> = v
                .get("price_changes")
                .and_then(|c| c.as_array())
                .cloned()
                .unwrap_or_default();
            let mut best_bid = None;
            let mut best_ask = None;
            for pc in &changes {
                if let Some(b) = pc.get("best_bid").and_then(parse_price_field) {
                    best_bid = Some(b);
                }
                if let Some(a) = pc.get("best_ask").and_then(parse_price_field) {
                    best_ask = Some(a);
                }
            }
            Frame::PriceChange { best_bid, best_ask, ts_ms, n_changes: changes.len() }
        }
        "tick_size_change" => {
            let tick_size = v.get("new_tick_size").and_then(parse_price_field)?;
            Frame::TickSizeChange { tick_size }
        }
        "last_trade_price" => {
            let price = v.get("price").and_then(parse_price_field)?;
            let side = v.get("side").and_then(|s| s.as_str()).unwrap_or("UNKNOWN").to_string();
            Frame::LastTrade { price, ts_ms, side }
        }
        other => Frame::Unknown { event_type: other.to_string() },
    })
}

/// Run the ingestor until `shutdown` fires. Reconnects with backoff on any
/// transport failure; never returns an error — transport failures are
/// logged and retried, matching the spec's "never blocks on downstream
/// consumers, never terminates the session on a parse error" contract.
pub async fn run(
    market: MarketConfig,
    mut shutdown: watch::Receiver<bool>,
    book: Arc<Mutex<BookState>>,
    trades: Arc<Mutex<TradeTimeline>>,
    logger: Arc<Mutex<EventLogger>>,
) {
    let mut backoff_ms = BACKOFF_START_MS;

    while !*shutdown.borrow() {
        let connect_result = connect_async(&market.wss_url).await;
        let ws = match connect_result {
            Ok((ws, _)) => {
                backoff_ms = BACKOFF_START_MS;
                ws
            }
            Err(e) => {
                logger
                    .lock()
                    .await
                    .write("ws_connect_error", serde_json::json!({"err": e.to_string()}));
                if wait_or_shutdown(&mut shutdown, backoff_ms).await {
                    return;
                }
                backoff_ms = (backoff_ms * 2).min(BACKOFF_MAX_MS);
                continue;
            }
        };

        let (mut write, mut read) = ws.split();
        let sub = serde_json::json!({"type": "subscribe", "channel": "market", "market": market.market});
        if write.send(Message::Text(sub.to_string())).await.is_err() {
            continue;
        }
        logger.lock().await.write("ws_subscribe", serde_json::json!({"payload": sub}));

        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_S));

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = ping_interval.tick() => {
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            logger.lock().await.write("ws_error", serde_json::json!({"err": e.to_string()}));
                            break;
                        }
                        None => break,
                    };
                    let Message::Text(text) = msg else { continue };
                    handle_frame(&text, &book, &trades, &logger).await;
                }
            }
        }

        if *shutdown.borrow() {
            return;
        }
        if wait_or_shutdown(&mut shutdown, backoff_ms).await {
            return;
        }
        backoff_ms = (backoff_ms * 2).min(BACKOFF_MAX_MS);
    }
}

/// Sleep for `ms`, but wake early and return `true` if shutdown fires
/// during the wait.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, ms: u64) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(ms)) => false,
        _ = shutdown.changed() => *shutdown.borrow(),
    }
}

async fn handle_frame(
    raw: &str,
    book: &Arc<Mutex<BookState>>,
    trades: &Arc<Mutex<TradeTimeline>>,
    logger: &Arc<Mutex<EventLogger>>,
) {
    let frame = match parse_frame(raw) {
        Some(f) => f,
        None => {
            logger.lock().await.write(
                "ws_parse_error",
                serde_json::json!({"raw": raw.chars().take(2000).collect::<String>()}),
            );
            return;
        }
    };

    match frame {
        Frame::Book { best_bid, best_ask, ts_ms } => {
            let mut b = book.lock().await;
            b.apply_book(best_bid, best_ask, ts_ms);
            let (bid, ask, mid, tick) = (b.best_bid, b.best_ask, b.mid, b.tick_size);
            drop(b);
            logger.lock().await.write(
                "ws_book",
                serde_json::json!({"best_bid": bid, "best_ask": ask, "mid": mid, "tick": tick}),
            );
        }
        Frame::PriceChange { best_bid, best_ask, ts_ms, n_changes } => {
            let mut b = book.lock().await;
            b.apply_book(best_bid, best_ask, ts_ms);
            let (bid, ask, mid) = (b.best_bid, b.best_ask, b.mid);
            drop(b);
            logger.lock().await.write(
                "ws_price_change",
                serde_json::json!({"best_bid": bid, "best_ask": ask, "mid": mid, "n_changes": n_changes}),
            );
        }
        Frame::TickSizeChange { tick_size } => {
            book.lock().await.apply_tick_size(tick_size);
            logger.lock().await.write("ws_tick_size_change", serde_json::json!({"tick": tick_size}));
        }
        Frame::LastTrade { price, ts_ms, side } => {
            book.lock().await.apply_trade(price, ts_ms);
            trades.lock().await.push(ts_ms);
            logger.lock().await.write("ws_last_trade", serde_json::json!({"price": price, "side": side}));
        }
        Frame::Unknown { event_type } => {
            logger.lock().await.write("ws_unknown", serde_json::json!({"event_type": event_type}));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_book_frame_with_synonyms() {
        let raw = r#"{"event_type":"book","buys":[{"price":"0.40","size":"10"}],"sells":[{"price":0.60,"size":5}],"timestamp":123}"#;
        match parse_frame(raw).unwrap() {
            Frame::Book { best_bid, best_ask, ts_ms } => {
                assert_eq!(best_bid, Some(0.40));
                assert_eq!(best_ask, Some(0.60));
                assert_eq!(ts_ms, 123);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn price_change_skips_malformed_entries_without_failing_batch() {
        let raw = r#"{"event_type":"price_change","price_changes":[{"best_bid":"not-a-number"},{"best_ask":"0.55"}],"timestamp":5}"#;
        match parse_frame(raw).unwrap() {
            Frame::PriceChange { best_bid, best_ask, n_changes, .. } => {
                assert_eq!(best_bid, None);
                assert_eq!(best_ask, Some(0.55));
                assert_eq!(n_changes, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_is_tagged_not_dropped() {
        let raw = r#"{"event_type":"mystery_frame"}"#;
        match parse_frame(raw).unwrap() {
            Frame::Unknown { event_type } => assert_eq!(event_type, "mystery_frame"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn garbage_payload_parses_to_none() {
        assert!(parse_frame("not json at all").is_none());
        assert!(parse_frame(r#"{"no_event_type_field": true}"#).is_none());
    }

    #[test]
    fn tick_size_change_requires_valid_tick() {
        assert!(parse_frame(r#"{"event_type":"tick_size_change","new_tick_size":"0.005"}"#).is_some());
        assert!(parse_frame(r#"{"event_type":"tick_size_change","new_tick_size":"nope"}"#).is_none());
    }
}
