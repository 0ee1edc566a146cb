use clap::Parser;
use market_report::analysis;
use market_report::config::{AppConfig, CHAT_ID_VAR, TOKEN_VAR};
use tracing_subscriber::EnvFilter;

/// Sends the daily market technical report to Telegram.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Log the report instead of delivering it; Telegram secrets are not required.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine: CI passes secrets through the environment.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.dry_run);
    if !config.is_runnable() {
        tracing::warn!("{TOKEN_VAR} or {CHAT_ID_VAR} is not set, nothing to do");
        return Ok(());
    }

    tracing::info!(
        instruments = config.watchlist.len(),
        dry_run = config.dry_run,
        "starting market report"
    );
    let summary = analysis::run_report(config).await?;

    tracing::info!(
        charts_sent = summary.charts_sent(),
        failed_lines = summary.failed_lines(),
        "market report finished"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("market_report=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
