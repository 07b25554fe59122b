//! Error taxonomy for the market maker.
//!
//! `LogicError` is the only variant that should ever cross a `panic!` —
//! everything else is caught at its owning task boundary, logged, and the
//! loop continues at its next cadence. See `telemetry::EventLogger::log_error`.

use thiserror::Error;

/// Top-level error taxonomy. Each task (ingestor, fill poller, quote loop,
/// gateway) maps its own failures into one of these before logging.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Missing or invalid credentials. Fatal at startup.
    #[error("credential error: {0}")]
    Credential(String),

    /// Network/transport failure talking to the venue (WS drop, HTTP
    /// timeout, connection refused). Recovered via reconnect/retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// The venue rejected an order or cancel request. Recovered by
    /// skipping that order this cycle.
    #[error("rejection error: {0}")]
    Rejection(String),

    /// Malformed or unparsable venue data (book/trade frame). The frame
    /// is dropped and the loop continues.
    #[error("data error: {0}")]
    Data(String),

    /// An internal invariant was violated. Not recoverable — the process
    /// should terminate rather than continue computing on corrupted state.
    #[error("logic error: {0}")]
    Logic(String),
}

impl EngineError {
    /// Short tag used as the `kind` field in error log records.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config",
            EngineError::Credential(_) => "credential",
            EngineError::Transport(_) => "transport",
            EngineError::Rejection(_) => "rejection",
            EngineError::Data(_) => "data",
            EngineError::Logic(_) => "logic",
        }
    }

    /// Whether this error should terminate the process rather than be
    /// logged and swallowed by the owning loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_) | EngineError::Credential(_) | EngineError::Logic(_)
        )
    }
}
