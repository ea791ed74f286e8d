//! Sentinel - Resilient DEX Trade Execution Core
//!
//! CLI entrypoint: wire the config into the aggregation stack and dispatch
//! the requested command.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use sentinel_trader::adapters::cli::{CheckConfigCmd, CliApp, Command, QuoteCmd};
use sentinel_trader::adapters::dexscreener::DexScreenerSource;
use sentinel_trader::adapters::jupiter::{JupiterConfig, JupiterPriceSource};
use sentinel_trader::application::price_aggregator::{AggregatorConfig, PriceAggregator};
use sentinel_trader::config::load_config;
use sentinel_trader::domain::profit_taker::default_tiers;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in config.toml)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug);

    match app.command {
        Command::Quote(cmd) => quote_command(cmd).await,
        Command::CheckConfig(cmd) => check_config_command(cmd),
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt().with_env_filter(filter).init();
}

async fn quote_command(cmd: QuoteCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;

    let jupiter = JupiterPriceSource::with_config(JupiterConfig {
        api_base_url: config.jupiter.api_url.clone(),
        api_key: config.jupiter.get_api_key(),
        ..JupiterConfig::default()
    })
    .context("Failed to create Jupiter client")?;
    let dexscreener = DexScreenerSource::new().context("Failed to create DexScreener client")?;

    let limiter = Arc::new(
        config
            .build_rate_limiter()
            .context("Failed to build rate limiter")?,
    );
    let breakers = Arc::new(config.build_breaker_registry());

    let aggregator = PriceAggregator::new(
        Arc::new(jupiter),
        Arc::new(dexscreener),
        limiter,
        breakers,
        AggregatorConfig::from(&config),
    );

    let quote = aggregator
        .get_aggregated_price(&cmd.input_mint, &cmd.output_mint, cmd.amount)
        .await
        .context("Failed to fetch aggregated price")?;

    println!("Price:      {} ({})", quote.price, quote.source);
    match (quote.validation_price, quote.price_diff) {
        (Some(validation), Some(diff)) => {
            println!("Validation: {validation} (diff {:.2}%)", diff * 100.0);
        }
        _ => println!("Validation: unavailable (single-source fallback)"),
    }
    if quote.degraded {
        println!("Warning:    sources diverge beyond the soft limit");
    }

    Ok(())
}

fn check_config_command(cmd: CheckConfigCmd) -> Result<()> {
    let path: &Path = cmd.config.as_ref();
    let config = load_config(path)
        .with_context(|| format!("Configuration at {} is invalid", path.display()))?;

    println!("Configuration OK: {}", path.display());
    println!("  sources:     {}", config.sources.len());
    println!("  venues:      {}", config.venues.len());
    if config.profit_taking.tiers.is_empty() {
        println!(
            "  profit tiers: built-in ladder ({} tiers)",
            default_tiers().len()
        );
    } else {
        println!("  profit tiers: {}", config.profit_taking.tiers.len());
    }
    Ok(())
}
