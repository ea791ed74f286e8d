//! CLI Adapter
//!
//! Command-line surface for operating the trading core. Uses clap derive
//! macros for argument parsing; dispatch lives in the binary entrypoint.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sentinel - resilient DEX trade execution core
#[derive(Parser, Debug)]
#[command(
    name = "sentinel-trader",
    version = env!("CARGO_PKG_VERSION"),
    about = "Resilient trade execution core for Solana DEX trading",
    long_about = "Sentinel executes DEX trades behind layered protections: per-source rate \
                  limiting, per-venue circuit breakers, and cross-source price validation."
)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a cross-validated price for a pair
    Quote(QuoteCmd),

    /// Load and validate a configuration file
    CheckConfig(CheckConfigCmd),
}

/// Fetch a cross-validated quote
#[derive(Parser, Debug)]
pub struct QuoteCmd {
    /// Input token mint address
    #[arg(value_name = "INPUT_MINT")]
    pub input_mint: String,

    /// Output token mint address
    #[arg(value_name = "OUTPUT_MINT")]
    pub output_mint: String,

    /// Amount in base units of the input token
    #[arg(value_name = "AMOUNT")]
    pub amount: u64,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,
}

/// Validate a configuration file without touching the network
#[derive(Parser, Debug)]
pub struct CheckConfigCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,
}

pub fn init() -> CliApp {
    CliApp::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_command_parses() {
        let app = CliApp::try_parse_from([
            "sentinel-trader",
            "quote",
            "So11111111111111111111111111111111111111112",
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "1000000000",
        ])
        .unwrap();
        match app.command {
            Command::Quote(cmd) => {
                assert_eq!(cmd.amount, 1_000_000_000);
                assert_eq!(cmd.config, PathBuf::from("config.toml"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_check_config_with_custom_path() {
        let app = CliApp::try_parse_from([
            "sentinel-trader",
            "check-config",
            "--config",
            "/tmp/sentinel.toml",
        ])
        .unwrap();
        match app.command {
            Command::CheckConfig(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("/tmp/sentinel.toml"))
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_verbose_flag() {
        let app =
            CliApp::try_parse_from(["sentinel-trader", "--verbose", "check-config"]).unwrap();
        assert!(app.verbose);
        assert!(!app.debug);
    }
}
