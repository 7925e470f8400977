use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A table of daily closing prices: one chronological date axis shared by
/// every symbol column. A `None` cell means the symbol had no trade on that
/// date (crypto trades weekends, equities don't).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PriceTable {
    pub dates: Vec<NaiveDate>,
    pub closes: BTreeMap<String, Vec<Option<f64>>>,
}

/// The raw close series for one symbol as it came back from the data
/// provider, before alignment onto a shared date axis.
#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol: String,
    pub points: Vec<(NaiveDate, Option<f64>)>,
}

impl PriceTable {
    /// Aligns per-symbol series onto the union of their dates. Dates a
    /// symbol has no point for become `None` cells.
    pub fn from_series(series: Vec<SymbolSeries>) -> Self {
        let mut dates: Vec<NaiveDate> = series
            .iter()
            .flat_map(|s| s.points.iter().map(|(d, _)| *d))
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let mut closes = BTreeMap::new();
        for s in series {
            let by_date: BTreeMap<NaiveDate, Option<f64>> = s.points.into_iter().collect();
            let column = dates
                .iter()
                .map(|d| by_date.get(d).copied().flatten())
                .collect();
            closes.insert(s.symbol, column);
        }

        Self { dates, closes }
    }

    pub fn row_count(&self) -> usize {
        self.dates.len()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.closes.keys().map(String::as_str)
    }

    /// Forward-fills each column in place: a missing close takes the most
    /// recent known value. Leading gaps stay empty since there is nothing
    /// to carry forward yet.
    pub fn forward_fill(&mut self) {
        for column in self.closes.values_mut() {
            let mut last_seen: Option<f64> = None;
            for cell in column.iter_mut() {
                match *cell {
                    Some(v) => last_seen = Some(v),
                    None => *cell = last_seen,
                }
            }
        }
    }
}
