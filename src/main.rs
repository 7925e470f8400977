mod config;
mod core;
mod fetch;
mod prices;
mod report;
mod storage;
mod tui;

use anyhow::bail;
use config::AppConfig;
use storage::AsyncStorageManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "snapshot".to_string());
    match mode.as_str() {
        "snapshot" => run_snapshot().await,
        "dashboard" => tui::run_dashboard().await,
        other => bail!("unknown mode {:?} (expected \"snapshot\" or \"dashboard\")", other),
    }
}

/// One-shot console report: fetch, analyze, print, exit.
async fn run_snapshot() -> anyhow::Result<()> {
    let storage = AsyncStorageManager::new_relative("storage").await?;
    let config = AppConfig::load(&storage).await?;

    let symbols = config.all_symbols();
    println!("Fetching {} symbols from Yahoo Finance...", symbols.len());
    let table = fetch::fetch_price_table(&symbols, &config.fetch).await?;

    let summary = core::analyze(&table, &config.benchmark)?;
    report::print_report(&summary, &config, table.dates.last().copied());

    Ok(())
}
