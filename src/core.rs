//! The deterministic heart of the tool: day-over-day percent change and
//! relative strength against a benchmark, plus the normalization and
//! moving-average helpers the dashboard charts are built from.
//!
//! Everything here is pure: no I/O, no logging, no shared state. Callers
//! get a typed error back and decide how to present it.

use crate::prices::PriceTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("need at least 2 rows of price history, got {rows}")]
    InsufficientHistory { rows: usize },
    #[error("benchmark symbol {0} has no price in the last two rows")]
    MissingBenchmark(String),
    #[error("previous close for {0} is zero, percent change is undefined")]
    DivisionByZero(String),
    #[error("price table has no rows")]
    EmptyTable,
    #[error("first close for {0} is zero, cannot rebase to 100")]
    ZeroBaseline(String),
    #[error("moving average window must be positive, got {0}")]
    InvalidWindow(usize),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SummaryRow {
    pub price: f64,
    pub day_pct: f64,
    pub rel_strength: f64,
}

impl SummaryRow {
    /// Copy with every field rounded to 2 decimals, for display. The raw
    /// row keeps full precision.
    pub fn rounded(&self) -> SummaryRow {
        let round2 = |v: f64| (v * 100.0).round() / 100.0;
        SummaryRow {
            price: round2(self.price),
            day_pct: round2(self.day_pct),
            rel_strength: round2(self.rel_strength),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SummaryTable {
    pub benchmark: String,
    pub rows: BTreeMap<String, SummaryRow>,
}

impl SummaryTable {
    /// Rows sorted descending by relative strength. Ties break on symbol
    /// name ascending so the ranking is deterministic. Sorting is a view;
    /// the underlying rows are untouched.
    pub fn ranked(&self) -> Vec<(&str, &SummaryRow)> {
        let mut ranked: Vec<(&str, &SummaryRow)> =
            self.rows.iter().map(|(s, r)| (s.as_str(), r)).collect();
        ranked.sort_by(|a, b| {
            b.1.rel_strength
                .partial_cmp(&a.1.rel_strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked
    }

    pub fn benchmark_day_pct(&self) -> Option<f64> {
        self.rows.get(&self.benchmark).map(|r| r.day_pct)
    }
}

/// Compares the last two rows of the table: per-symbol day percent change
/// and that change relative to the benchmark's.
///
/// A symbol with a close in only one of the two rows has no valid
/// comparison and is left out of the summary; that is not an error. A
/// previous close of exactly zero is an error rather than a silent inf.
pub fn analyze(table: &PriceTable, benchmark: &str) -> Result<SummaryTable, CoreError> {
    let rows = table.row_count();
    if rows < 2 {
        return Err(CoreError::InsufficientHistory { rows });
    }
    let (latest_idx, prev_idx) = (rows - 1, rows - 2);

    let mut day_pct: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for (symbol, column) in &table.closes {
        // get() rather than indexing: a deserialized table may carry a
        // column shorter than the date axis, which reads as a gap here.
        let cell = |idx: usize| column.get(idx).copied().flatten();
        let (Some(latest), Some(previous)) = (cell(latest_idx), cell(prev_idx)) else {
            continue;
        };
        if previous == 0.0 {
            return Err(CoreError::DivisionByZero(symbol.clone()));
        }
        let pct = (latest - previous) / previous * 100.0;
        day_pct.insert(symbol, (latest, pct));
    }

    let &(_, benchmark_pct) = day_pct
        .get(benchmark)
        .ok_or_else(|| CoreError::MissingBenchmark(benchmark.to_string()))?;

    let summary_rows = day_pct
        .into_iter()
        .map(|(symbol, (price, pct))| {
            (
                symbol.to_string(),
                SummaryRow {
                    price,
                    day_pct: pct,
                    rel_strength: pct - benchmark_pct,
                },
            )
        })
        .collect();

    Ok(SummaryTable {
        benchmark: benchmark.to_string(),
        rows: summary_rows,
    })
}

/// Rescales every column so its first known close is exactly 100, which
/// puts assets with wildly different price levels on one growth axis.
/// Leading gaps stay gaps; the baseline is the first present value.
pub fn normalize(table: &PriceTable) -> Result<PriceTable, CoreError> {
    if table.row_count() == 0 {
        return Err(CoreError::EmptyTable);
    }

    let mut normalized = PriceTable {
        dates: table.dates.clone(),
        closes: BTreeMap::new(),
    };

    for (symbol, column) in &table.closes {
        let baseline = match column.iter().flatten().next() {
            Some(&v) if v == 0.0 => return Err(CoreError::ZeroBaseline(symbol.clone())),
            Some(&v) => v,
            // A column with no data at all stays empty.
            None => {
                normalized.closes.insert(symbol.clone(), column.clone());
                continue;
            }
        };
        let rescaled = column
            .iter()
            .map(|cell| cell.map(|v| 100.0 * v / baseline))
            .collect();
        normalized.closes.insert(symbol.clone(), rescaled);
    }

    Ok(normalized)
}

/// Trailing simple moving average. Output has the same length as the
/// input; positions where the window has not yet filled (or where a gap
/// falls inside the window) are `None`, never zero.
///
/// A window longer than the series yields all `None` rather than an
/// error, so a chart overlay can just draw nothing.
pub fn moving_average(series: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>, CoreError> {
    if window == 0 {
        return Err(CoreError::InvalidWindow(window));
    }

    let out = (0..series.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &series[i + 1 - window..=i];
            let mut sum = 0.0;
            for cell in slice {
                sum += (*cell)?;
            }
            Some(sum / window as f64)
        })
        .collect();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::{PriceTable, SymbolSeries};
    use chrono::NaiveDate;

    fn table(columns: &[(&str, &[Option<f64>])]) -> PriceTable {
        let len = columns.first().map_or(0, |(_, c)| c.len());
        let series = columns
            .iter()
            .map(|(symbol, closes)| SymbolSeries {
                symbol: symbol.to_string(),
                points: closes
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| {
                        (NaiveDate::from_ymd_opt(2024, 3, i as u32 + 1).unwrap(), v)
                    })
                    .collect(),
            })
            .collect();
        let built = PriceTable::from_series(series);
        assert_eq!(built.row_count(), len);
        built
    }

    #[test]
    fn worked_example_spy_vs_aaa() {
        let t = table(&[
            ("SPY", &[Some(100.0), Some(101.0)]),
            ("AAA", &[Some(50.0), Some(52.0)]),
        ]);
        let summary = analyze(&t, "SPY").unwrap();

        let spy = summary.rows["SPY"];
        let aaa = summary.rows["AAA"];
        assert!((spy.day_pct - 1.0).abs() < 1e-9);
        assert!((aaa.day_pct - 4.0).abs() < 1e-9);
        assert!((aaa.rel_strength - 3.0).abs() < 1e-9);
        assert_eq!(spy.rel_strength, 0.0);
        assert_eq!(aaa.price, 52.0);

        let ranked: Vec<&str> = summary.ranked().iter().map(|(s, _)| *s).collect();
        assert_eq!(ranked, vec!["AAA", "SPY"]);
    }

    #[test]
    fn benchmark_rel_strength_is_exactly_zero() {
        let t = table(&[
            ("SPY", &[Some(471.13), Some(468.99)]),
            ("NVDA", &[Some(880.0), Some(903.5)]),
            ("XLE", &[Some(93.2), Some(92.8)]),
        ]);
        let summary = analyze(&t, "SPY").unwrap();
        assert_eq!(summary.rows["SPY"].rel_strength, 0.0);
    }

    #[test]
    fn rel_strength_identity_holds_for_all_symbols() {
        let t = table(&[
            ("SPY", &[Some(470.0), Some(474.7)]),
            ("GOOG", &[Some(150.0), Some(149.1)]),
            ("LMT", &[Some(450.0), Some(457.3)]),
        ]);
        let summary = analyze(&t, "SPY").unwrap();
        let bench = summary.rows["SPY"].day_pct;
        for row in summary.rows.values() {
            assert!((row.rel_strength - (row.day_pct - bench)).abs() < 1e-9);
        }
    }

    #[test]
    fn ranking_is_descending_with_symbol_tiebreak() {
        // ZZZ and AAA move identically, so the tie breaks alphabetically.
        let t = table(&[
            ("SPY", &[Some(100.0), Some(100.0)]),
            ("ZZZ", &[Some(10.0), Some(10.5)]),
            ("AAA", &[Some(20.0), Some(21.0)]),
            ("MID", &[Some(30.0), Some(30.3)]),
        ]);
        let summary = analyze(&t, "SPY").unwrap();
        let ranked: Vec<&str> = summary.ranked().iter().map(|(s, _)| *s).collect();
        assert_eq!(ranked, vec!["AAA", "ZZZ", "MID", "SPY"]);
    }

    #[test]
    fn ranking_ignores_series_input_order() {
        let columns: Vec<(&str, &[Option<f64>])> = vec![
            ("SPY", &[Some(100.0), Some(100.0)]),
            ("ZZZ", &[Some(10.0), Some(10.5)]),
            ("AAA", &[Some(20.0), Some(21.0)]),
            ("MID", &[Some(30.0), Some(30.3)]),
        ];
        let mut reversed = columns.clone();
        reversed.reverse();

        let forward = analyze(&table(&columns), "SPY").unwrap();
        let backward = analyze(&table(&reversed), "SPY").unwrap();

        let forward_ranked: Vec<&str> = forward.ranked().iter().map(|(s, _)| *s).collect();
        let backward_ranked: Vec<&str> = backward.ranked().iter().map(|(s, _)| *s).collect();
        assert_eq!(forward_ranked, backward_ranked);
        assert_eq!(forward_ranked, vec!["AAA", "ZZZ", "MID", "SPY"]);
    }

    #[test]
    fn ragged_deserialized_column_reads_as_a_gap() {
        // A hand-edited snapshot can carry a column shorter than the date
        // axis; that must not panic, the short column just has no data at
        // the compared positions.
        let json = r#"{
            "dates": ["2024-03-01", "2024-03-02", "2024-03-03"],
            "closes": {
                "SPY": [470.0, 471.0],
                "NVDA": [880.0, 890.0, 903.5]
            }
        }"#;
        let ragged: PriceTable = serde_json::from_str(json).unwrap();
        assert_eq!(ragged.row_count(), 3);

        // SPY's column stops before the last two rows, so the benchmark
        // has no comparable closes.
        assert_eq!(
            analyze(&ragged, "SPY").unwrap_err(),
            CoreError::MissingBenchmark("SPY".into())
        );
        let summary = analyze(&ragged, "NVDA").unwrap();
        assert_eq!(summary.rows.len(), 1);
        assert!(summary.rows.contains_key("NVDA"));
    }

    #[test]
    fn single_row_is_insufficient_history() {
        let t = table(&[("SPY", &[Some(470.0)])]);
        assert_eq!(
            analyze(&t, "SPY").unwrap_err(),
            CoreError::InsufficientHistory { rows: 1 }
        );
    }

    #[test]
    fn missing_benchmark_is_an_error() {
        let t = table(&[("NVDA", &[Some(880.0), Some(903.5)])]);
        assert_eq!(
            analyze(&t, "SPY").unwrap_err(),
            CoreError::MissingBenchmark("SPY".into())
        );
    }

    #[test]
    fn benchmark_with_gap_in_previous_row_is_missing() {
        let t = table(&[
            ("SPY", &[None, Some(470.0)]),
            ("NVDA", &[Some(880.0), Some(903.5)]),
        ]);
        assert_eq!(
            analyze(&t, "SPY").unwrap_err(),
            CoreError::MissingBenchmark("SPY".into())
        );
    }

    #[test]
    fn zero_previous_close_fails_loudly() {
        let t = table(&[
            ("SPY", &[Some(470.0), Some(471.0)]),
            ("BAD", &[Some(0.0), Some(1.0)]),
        ]);
        assert_eq!(
            analyze(&t, "SPY").unwrap_err(),
            CoreError::DivisionByZero("BAD".into())
        );
    }

    #[test]
    fn symbol_absent_from_one_row_is_excluded_not_an_error() {
        let t = table(&[
            ("SPY", &[Some(470.0), Some(471.0)]),
            ("NEWLY-LISTED", &[None, Some(12.0)]),
        ]);
        let summary = analyze(&t, "SPY").unwrap();
        assert_eq!(summary.rows.len(), 1);
        assert!(!summary.rows.contains_key("NEWLY-LISTED"));
    }

    #[test]
    fn rounding_is_a_separate_view() {
        let row = SummaryRow {
            price: 123.456,
            day_pct: 1.005,
            rel_strength: -0.126,
        };
        let r = row.rounded();
        assert_eq!(r.price, 123.46);
        assert_eq!(r.rel_strength, -0.13);
        // Raw row untouched.
        assert_eq!(row.price, 123.456);
    }

    #[test]
    fn normalize_rebases_first_close_to_100() {
        let t = table(&[
            ("SPY", &[Some(400.0), Some(404.0), Some(410.0)]),
            ("BTC-USD", &[Some(40000.0), Some(42000.0), Some(39000.0)]),
        ]);
        let n = normalize(&t).unwrap();
        assert_eq!(n.closes["SPY"], vec![Some(100.0), Some(101.0), Some(102.5)]);
        assert_eq!(n.closes["BTC-USD"], vec![Some(100.0), Some(105.0), Some(97.5)]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let t = table(&[
            ("SPY", &[Some(400.0), Some(404.0), Some(410.0)]),
            ("DAL", &[None, Some(40.0), Some(41.0)]),
        ]);
        let once = normalize(&t).unwrap();
        let twice = normalize(&once).unwrap();
        for symbol in ["SPY", "DAL"] {
            for (a, b) in once.closes[symbol].iter().zip(&twice.closes[symbol]) {
                match (a, b) {
                    (Some(a), Some(b)) => assert!((a - b).abs() < 1e-9),
                    (None, None) => {}
                    other => panic!("mismatched cells: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn normalize_rejects_empty_table_and_zero_baseline() {
        let empty = PriceTable::default();
        assert_eq!(normalize(&empty).unwrap_err(), CoreError::EmptyTable);

        let t = table(&[("BAD", &[Some(0.0), Some(1.0)])]);
        assert_eq!(normalize(&t).unwrap_err(), CoreError::ZeroBaseline("BAD".into()));
    }

    #[test]
    fn moving_average_over_simple_series() {
        let series: Vec<Option<f64>> = [1.0, 2.0, 3.0, 4.0, 5.0].map(Some).to_vec();
        let ma = moving_average(&series, 3).unwrap();
        assert_eq!(ma, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn moving_average_skips_windows_containing_gaps() {
        let series = vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)];
        let ma = moving_average(&series, 3).unwrap();
        assert_eq!(ma, vec![None, None, None, None, Some(4.0)]);
    }

    #[test]
    fn moving_average_window_longer_than_series_degrades_to_none() {
        let series: Vec<Option<f64>> = [1.0, 2.0].map(Some).to_vec();
        assert_eq!(moving_average(&series, 5).unwrap(), vec![None, None]);
    }

    #[test]
    fn moving_average_rejects_zero_window() {
        assert_eq!(
            moving_average(&[Some(1.0)], 0),
            Err(CoreError::InvalidWindow(0))
        );
    }
}
