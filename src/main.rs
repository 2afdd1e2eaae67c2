use anyhow::Context;
use clap::Parser;
use position_guard::cli::{Cli, Commands};
use position_guard::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))
                .context("Invalid default config")?
        }
    };

    // Initialize telemetry
    let telemetry = position_guard::telemetry::init_telemetry(&config.telemetry)?;
    if let Some(addr) = telemetry.metrics_addr {
        tracing::info!(%addr, "Metrics endpoint listening");
    }

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(paused = args.paused, once = args.once, "Starting position guard");
            args.execute(&config).await?;
        }
        Commands::Levels(args) => args.execute(&config)?,
        Commands::Size(args) => args.execute(&config)?,
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Loops: watcher={}s oco={}s sweep={}s sync={}s{}",
                config.watcher.watcher_interval_secs,
                config.watcher.oco_interval_secs,
                config.watcher.sweep_interval_secs,
                config.watcher.sync_interval_secs,
                if config.watcher.start_paused { " (start paused)" } else { "" }
            );
            println!(
                "  Risk: SL={}% TP={}% Trailing={} {}% MinStep={} ticks of {}",
                config.risk.stop_loss_pct * rust_decimal_macros::dec!(100),
                config.risk.take_profit_pct * rust_decimal_macros::dec!(100),
                config.risk.trailing_type,
                config.risk.trailing_pct * rust_decimal_macros::dec!(100),
                config.risk.min_step_ticks,
                config.risk.tick_size
            );
            println!(
                "  Rate limit: {} orders/min, backoff {}ms",
                config.rate_limit.orders_per_minute, config.rate_limit.backoff_ms
            );
            println!(
                "  Cooldown: lookback {}m, first trade {}m, same direction {}m, reversal {}m",
                config.cooldown.lookback_minutes,
                config.cooldown.first_trade_minutes,
                config.cooldown.same_direction_minutes,
                config.cooldown.reversal_minutes
            );
            println!(
                "  Sizing: tiers {}/{}/{}, max position {}, max sector {}",
                config.sizing.small_tier_pct,
                config.sizing.medium_tier_pct,
                config.sizing.large_tier_pct,
                config.sizing.max_position_pct,
                config.sizing.max_sector_pct
            );
            match &config.journal.path {
                Some(path) => println!("  Journal: {}", path.display()),
                None => println!("  Journal: disabled"),
            }
            println!("  Paper accounts: {}", config.paper.accounts.len());
        }
    }

    Ok(())
}
