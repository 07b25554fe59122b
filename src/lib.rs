pub mod book;
pub mod cli;
pub mod config;
pub mod error;
pub mod exchange;
pub mod ingestor;
pub mod ladder;
pub mod math;
pub mod orchestrator;
pub mod quoter;
pub mod reconciler;
pub mod risk;
pub mod telemetry;
pub mod types;
