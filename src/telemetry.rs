//! Structured JSON-lines event log plus calibration-snapshot persistence.
//!
//! One `EventLogger` is owned by the orchestrator and handed to every
//! other task as the sole place writes happen — mirrors the single-writer
//! convention the rest of the crate uses for shared state.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::EngineError;
use crate::risk::CalibrationSnapshot;

/// Line-buffered JSON-lines writer. Every record gets a `ts_ms` and
/// `event` field merged in ahead of the caller's payload.
pub struct EventLogger {
    file: File,
}

impl EventLogger {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Config(format!("creating log dir: {}", e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EngineError::Config(format!("opening log file: {}", e)))?;
        Ok(Self { file })
    }

    /// Append one structured event. `payload` fields are merged alongside
    /// `ts_ms`/`event`; a payload field named `ts_ms` or `event` would be
    /// shadowed, so callers should avoid those names.
    pub fn write(&mut self, event: &str, payload: Value) {
        let mut rec = json!({
            "ts_ms": chrono::Utc::now().timestamp_millis(),
            "event": event,
        });
        if let (Value::Object(ref mut rec_map), Value::Object(payload_map)) = (&mut rec, payload) {
            rec_map.extend(payload_map);
        }
        // A malformed record is a bug in the caller, not a recoverable I/O
        // condition — serialization of our own types cannot fail.
        let line = serde_json::to_string(&rec).expect("event record always serializes");
        let _ = writeln!(self.file, "{}", line);
    }

    /// Log a recovered error with operation context, matching the
    /// `error_<event>` naming the rest of the taxonomy uses.
    pub fn log_error(&mut self, operation: &str, err: &EngineError, context: Value) {
        self.write(
            "error",
            json!({
                "operation": operation,
                "kind": err.kind(),
                "message": err.to_string(),
                "context": context,
            }),
        );
    }

    pub fn write_typed<T: Serialize>(&mut self, event: &str, payload: &T) {
        let value = serde_json::to_value(payload).expect("event payload always serializes");
        self.write(event, value);
    }
}

/// Persist the warm-up calibration snapshot as pretty JSON, creating
/// parent directories as needed.
pub fn write_calibration_snapshot(
    path: &Path,
    snapshot: &CalibrationSnapshot,
) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| EngineError::Config(format!("creating calibration dir: {}", e)))?;
    }
    let text = serde_json::to_string_pretty(snapshot)
        .map_err(|e| EngineError::Logic(format!("serializing calibration snapshot: {}", e)))?;
    std::fs::write(path, text)
        .map_err(|e| EngineError::Config(format!("writing calibration snapshot: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_appends_ts_and_event_fields() {
        let dir = std::env::temp_dir().join(format!("mm-telemetry-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("events.jsonl");
        {
            let mut logger = EventLogger::open(&path).unwrap();
            logger.write("ws_book", json!({"best_bid": 0.4, "best_ask": 0.6}));
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let parsed: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["event"], "ws_book");
        assert!(parsed["ts_ms"].is_i64());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn calibration_snapshot_roundtrips_through_json() {
        let dir = std::env::temp_dir().join(format!("mm-calib-test-{}", std::process::id()));
        let path = dir.join("calib.json");
        let snap = CalibrationSnapshot {
            n_returns: 400,
            dt_sample_s: 5.0,
            sigma_base_logit_per_dt: 0.01,
            ema_fast_abs: 0.002,
            ema_slow_abs: 0.0015,
        };
        write_calibration_snapshot(&path, &snap).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let back: CalibrationSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back.n_returns, 400);
        std::fs::remove_dir_all(&dir).ok();
    }
}
