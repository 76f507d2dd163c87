use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Stock snapshot ────────────────────────────────────────────────────────────

/// One row of real market data for one instrument on one trade date.
///
/// Numeric columns are optional: a missing column, a JSON `null` or an
/// unparseable string all decode to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockSnapshot {
    pub ts_code: String,
    pub trade_date: String,  // YYYYMMDD or YYYY-MM-DD, as received
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub pre_close: Option<f64>,
    pub pct_chg: Option<f64>,  // signed percent
    pub vol: Option<f64>,
    pub amount: Option<f64>,
    pub turnover_rate: Option<f64>,
    pub ma5: Option<f64>,
    pub ma10: Option<f64>,
    pub ma120: Option<f64>,
    pub ma250: Option<f64>,
    /// Alias of `ma120`, present only when the schema carries that column.
    pub half_year_line: Option<f64>,
    /// Alias of `ma250`, present only when the schema carries that column.
    pub year_line: Option<f64>,
    /// Columns whose names are outside the known schema.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ── Synthetic series ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayBar {
    pub date: String,
    pub open: f64,
    pub close: f64,
    pub low: f64,
    pub high: f64,
    pub volume: f64,
    pub synthetic: bool,
}

impl DayBar {
    /// `[open, close, low, high]`, the candlestick data order.
    pub fn candle(&self) -> [f64; 4] {
        [self.open, self.close, self.low, self.high]
    }

    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

/// 41 bars centred on the snapshot's trade date plus derived moving averages.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyntheticSeries {
    pub bars: Vec<DayBar>,
    pub ma5: Vec<Option<f64>>,
    pub ma10: Vec<Option<f64>>,
    pub ma20: Vec<Option<f64>>,
    pub ma60: Vec<Option<f64>>,
}

impl SyntheticSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn categories(&self) -> Vec<String> {
        self.bars.iter().map(|b| b.date.clone()).collect()
    }

    /// The single bar copied from real data.
    pub fn real_bar(&self) -> Option<&DayBar> {
        self.bars.iter().find(|b| !b.synthetic)
    }
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryMode {
    #[default]
    Normal,
    LimitUp,
    LimitDown,
    HalfYearLine,
    YearLine,
}

impl QueryMode {
    pub fn endpoint(self) -> &'static str {
        match self {
            QueryMode::Normal => "/api/stock/data",
            QueryMode::LimitUp => "/api/stock/limit-up",
            QueryMode::LimitDown => "/api/stock/limit-down",
            QueryMode::HalfYearLine => "/api/stock/half-year-line",
            QueryMode::YearLine => "/api/stock/year-line",
        }
    }

    /// Human label used in notices and the summary block.
    pub fn label(self) -> &'static str {
        match self {
            QueryMode::Normal => "stock data",
            QueryMode::LimitUp => "limit-up data",
            QueryMode::LimitDown => "limit-down data",
            QueryMode::HalfYearLine => "half-year line data",
            QueryMode::YearLine => "year line data",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Search form of the all-stocks query. Empty fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockFilter {
    pub ts_code: Option<String>,
    pub trade_date: Option<String>,
    pub pct_chg_min: Option<f64>,
    pub pct_chg_max: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
}

impl StockFilter {
    pub fn is_empty(&self) -> bool {
        *self == StockFilter::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub num: u32,
    pub size: u32,
}

impl PageRequest {
    /// Nine cards per page, a 3x3 grid.
    pub const DEFAULT_SIZE: u32 = 9;

    pub fn first(size: u32) -> Self {
        Self { num: 1, size }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(Self::DEFAULT_SIZE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockQuery {
    pub mode: QueryMode,
    pub filter: StockFilter,
    pub page: PageRequest,
}

impl StockQuery {
    pub fn new(mode: QueryMode, page: PageRequest) -> Self {
        Self {
            mode,
            filter: StockFilter::default(),
            page,
        }
    }

    /// Query-string pairs in the order the API documents them. Filters are
    /// only meaningful for the all-stocks endpoint.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();

        if self.mode == QueryMode::Normal {
            let f = &self.filter;
            let text = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);

            if let Some(v) = text(&f.ts_code) {
                params.push(("tsCode", v));
            }
            if let Some(v) = text(&f.trade_date) {
                params.push(("tradeDate", v));
            }
            for (key, value) in [
                ("pctChgMin", f.pct_chg_min),
                ("pctChgMax", f.pct_chg_max),
                ("priceMin", f.price_min),
                ("priceMax", f.price_max),
            ] {
                if let Some(v) = value {
                    params.push((key, v.to_string()));
                }
            }
        }

        params.push(("pageNum", self.page.num.to_string()));
        params.push(("size", self.page.size.to_string()));
        params
    }
}

// ── Decoded response ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StockPage {
    pub stock_count: u64,
    pub date: Option<String>,
    pub page: Option<u32>,
    pub column_names: Vec<String>,
    pub stocks: Vec<StockSnapshot>,
}
