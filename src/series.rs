//! In-memory OHLCV series shared by the chart renderer and the indicators.

use chrono::NaiveDate;

/// One daily OHLCV row.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Bars for one symbol, strictly ordered by date with no duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Builds a series from rows in any order.
    ///
    /// Rows are sorted by date. When a date appears more than once the row
    /// that came last in the input wins, which matches how providers patch
    /// the still-open session at the tail of a response.
    pub fn from_rows(symbol: impl Into<String>, mut rows: Vec<Bar>) -> Self {
        // stable sort keeps input order among equal dates
        rows.sort_by_key(|b| b.date);
        let mut bars: Vec<Bar> = Vec::with_capacity(rows.len());
        for bar in rows {
            match bars.last_mut() {
                Some(prev) if prev.date == bar.date => *prev = bar,
                _ => bars.push(bar),
            }
        }
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bars: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.bars.iter().map(|b| b.close)
    }

    pub fn volumes(&self) -> impl Iterator<Item = f64> + '_ {
        self.bars.iter().map(|b| b.volume as f64)
    }
}
