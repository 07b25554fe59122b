//! Command-line entry point: a config path and a `--dry-run` switch.

use std::path::PathBuf;

use clap::Parser;

/// Run the prediction-market maker against the configured venue, or in
/// `--dry-run` paper-trading mode against an in-memory exchange.
#[derive(Parser, Debug)]
#[command(name = "market-maker", version, about)]
pub struct Cli {
    /// Path to the JSON configuration file (see `Config` for the schema).
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Trade against an in-memory paper exchange instead of the live
    /// venue. No credentials are required in this mode.
    #[arg(long)]
    pub dry_run: bool,
}
