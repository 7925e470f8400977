use anyhow::{Context, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::storage::AsyncStorageManager;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FetchConfig {
    pub range: String,    // e.g. "5d", "1mo", "1y"
    pub interval: String, // e.g. "1d"
}

/// Holdings and watchlist, kept in named groups so the report can label
/// where each symbol came from.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TickerGroups {
    pub portfolio_bull: Vec<String>,
    pub portfolio_bear: Vec<String>,
    pub watchlist: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub tickers: TickerGroups,
    pub benchmark: String,
    pub fetch: FetchConfig,
    pub ma_window: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let to_vec = |symbols: &[&str]| symbols.iter().map(|s| s.to_string()).collect();
        Self {
            tickers: TickerGroups {
                portfolio_bull: to_vec(&["GOOG"]),
                portfolio_bear: to_vec(&["XLF", "XLE", "SGOV"]),
                watchlist: to_vec(&["NVDA", "SOL-USD", "DAL", "JPM", "LMT"]),
            },
            benchmark: "SPY".to_string(),
            fetch: FetchConfig {
                range: "5d".to_string(),
                interval: "1d".to_string(),
            },
            ma_window: 50,
        }
    }
}

impl AppConfig {
    /// Loads `storage/config.json` next to the binary, writing the
    /// defaults there on first run.
    pub async fn load(storage: &AsyncStorageManager) -> anyhow::Result<Self> {
        let config: AppConfig = storage
            .load_or_init("config", AppConfig::default())
            .await
            .context("loading config.json")?;
        config.validate()?;
        Ok(config)
    }

    /// Every configured symbol plus the benchmark, deduplicated, in group
    /// order. The benchmark is always fetched even if nobody listed it.
    pub fn all_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = Vec::new();
        let groups = [
            &self.tickers.portfolio_bull,
            &self.tickers.portfolio_bear,
            &self.tickers.watchlist,
        ];
        for group in groups {
            for s in group {
                if !symbols.contains(s) {
                    symbols.push(s.clone());
                }
            }
        }
        if !symbols.contains(&self.benchmark) {
            symbols.push(self.benchmark.clone());
        }
        symbols
    }

    /// Group label for the report's "Group" column.
    pub fn group_of(&self, symbol: &str) -> &'static str {
        if symbol == self.benchmark {
            "Benchmark"
        } else if self.tickers.portfolio_bull.iter().any(|s| s == symbol) {
            "Portfolio (Bull)"
        } else if self.tickers.portfolio_bear.iter().any(|s| s == symbol) {
            "Portfolio (Bear)"
        } else if self.tickers.watchlist.iter().any(|s| s == symbol) {
            "Watchlist"
        } else {
            "N/A"
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        // Yahoo-style tickers: uppercase alphanumerics plus '.' and '-'
        // (e.g. BRK.B, SOL-USD).
        let symbol_re = Regex::new(r"^[A-Z0-9.\-]{1,12}$").expect("valid symbol regex");
        for symbol in self.all_symbols() {
            if !symbol_re.is_match(&symbol) {
                bail!("invalid ticker symbol in config: {:?}", symbol);
            }
        }
        if self.ma_window == 0 {
            bail!("ma_window must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_include_benchmark_once() {
        let config = AppConfig::default();
        config.validate().unwrap();

        let symbols = config.all_symbols();
        assert_eq!(symbols.iter().filter(|s| *s == "SPY").count(), 1);
        assert!(symbols.contains(&"SOL-USD".to_string()));
    }

    #[test]
    fn lowercase_symbol_is_rejected() {
        let mut config = AppConfig::default();
        config.tickers.watchlist.push("nvda".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn group_labels_resolve() {
        let config = AppConfig::default();
        assert_eq!(config.group_of("SPY"), "Benchmark");
        assert_eq!(config.group_of("GOOG"), "Portfolio (Bull)");
        assert_eq!(config.group_of("XLE"), "Portfolio (Bear)");
        assert_eq!(config.group_of("DAL"), "Watchlist");
        assert_eq!(config.group_of("UNKNOWN"), "N/A");
    }
}
