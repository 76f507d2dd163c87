//! Lenient decoding of the API's positional `grid_data` payload.
//!
//! `grid_data` is `[stock][row][column]`. Each stock's first row becomes one
//! [`StockSnapshot`]; columns are named by `column_names` or, when the
//! response omits it, by [`DEFAULT_COLUMNS`]. Nothing in here fails: a
//! malformed payload decodes to fewer stocks or to `None` fields.

use crate::models::{StockPage, StockSnapshot};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_COLUMNS: [&str; 15] = [
    "ts_code",
    "trade_date",
    "open",
    "high",
    "low",
    "close",
    "pre_close",
    "pct_chg",
    "vol",
    "amount",
    "turnover_rate",
    "ma5",
    "ma10",
    "ma120",
    "ma250",
];

// ── Column schema ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    TsCode,
    TradeDate,
    Open,
    High,
    Low,
    Close,
    PreClose,
    PctChg,
    Vol,
    Amount,
    TurnoverRate,
    Ma5,
    Ma10,
    Ma120,
    Ma250,
}

impl Column {
    /// Accepts snake_case and camelCase spellings, case-insensitively.
    fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        Some(match key.as_str() {
            "tscode" => Column::TsCode,
            "tradedate" => Column::TradeDate,
            "open" => Column::Open,
            "high" => Column::High,
            "low" => Column::Low,
            "close" => Column::Close,
            "preclose" => Column::PreClose,
            "pctchg" => Column::PctChg,
            "vol" => Column::Vol,
            "amount" => Column::Amount,
            "turnoverrate" => Column::TurnoverRate,
            "ma5" => Column::Ma5,
            "ma10" => Column::Ma10,
            "ma120" => Column::Ma120,
            "ma250" => Column::Ma250,
            _ => return None,
        })
    }
}

// ── Scalar coercion ───────────────────────────────────────────────────────────

/// Numbers pass through, numeric strings are parsed, everything else is `None`.
pub fn scalar_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Strings pass through, numbers are printed, `null` is empty.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 8-digit `YYYYMMDD` → `YYYY-MM-DD`; any other input is returned unchanged.
pub fn format_date(date: &str) -> String {
    let date = date.trim();
    if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &date[0..4], &date[4..6], &date[6..8])
    } else {
        date.to_string()
    }
}

// ── Rows ──────────────────────────────────────────────────────────────────────

fn decode_row(row: &[Value], columns: &[String]) -> StockSnapshot {
    let mut stock = StockSnapshot::default();

    // zip stops at the shorter side: trailing values without a name are dropped
    for (value, name) in row.iter().zip(columns) {
        let Some(column) = Column::from_name(name) else {
            stock.extra.insert(name.clone(), value.clone());
            continue;
        };

        let num = scalar_f64(value);
        match column {
            Column::TsCode => stock.ts_code = scalar_text(value),
            Column::TradeDate => stock.trade_date = scalar_text(value),
            Column::Open => stock.open = num,
            Column::High => stock.high = num,
            Column::Low => stock.low = num,
            Column::Close => stock.close = num,
            Column::PreClose => stock.pre_close = num,
            Column::PctChg => stock.pct_chg = num,
            Column::Vol => stock.vol = num,
            Column::Amount => stock.amount = num,
            Column::TurnoverRate => stock.turnover_rate = num,
            Column::Ma5 => stock.ma5 = num,
            Column::Ma10 => stock.ma10 = num,
            Column::Ma120 => stock.ma120 = num,
            Column::Ma250 => stock.ma250 = num,
        }
    }

    stock
}

/// Decode `grid_data` into snapshots. A missing or non-array payload yields an
/// empty vector; stocks without a usable first row are skipped.
pub fn decode_grid(grid_data: Option<&Value>, column_names: Option<&[String]>) -> Vec<StockSnapshot> {
    let Some(stocks) = grid_data.and_then(Value::as_array) else {
        return Vec::new();
    };

    let columns: Vec<String> = match column_names {
        Some(names) => names.to_vec(),
        None => DEFAULT_COLUMNS.iter().map(|s| s.to_string()).collect(),
    };
    let has_half_year = columns.iter().any(|c| Column::from_name(c) == Some(Column::Ma120));
    let has_year = columns.iter().any(|c| Column::from_name(c) == Some(Column::Ma250));

    let mut out = Vec::with_capacity(stocks.len());
    for (i, rows) in stocks.iter().enumerate() {
        let first = rows
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(Value::as_array)
            .filter(|row| !row.is_empty());

        let Some(row) = first else {
            debug!("grid_data[{}]: no usable row, skipped", i);
            continue;
        };

        let mut stock = decode_row(row, &columns);
        if has_half_year {
            stock.half_year_line = stock.ma120;
        }
        if has_year {
            stock.year_line = stock.ma250;
        }
        out.push(stock);
    }
    out
}

/// Decode a whole API response body.
pub fn decode_response(body: &Value) -> StockPage {
    let column_names: Option<Vec<String>> = body
        .get("column_names")
        .and_then(Value::as_array)
        .map(|names| names.iter().map(scalar_text).collect());

    let stocks = decode_grid(body.get("grid_data"), column_names.as_deref());

    StockPage {
        stock_count: body
            .get("stock_count")
            .and_then(scalar_f64)
            .filter(|n| n.is_finite() && *n > 0.0)
            .map(|n| n as u64)
            .unwrap_or(0),
        date: body.get("date").map(scalar_text).filter(|s| !s.is_empty()),
        page: body.get("page").and_then(scalar_f64).map(|n| n as u32),
        column_names: column_names
            .unwrap_or_else(|| DEFAULT_COLUMNS.iter().map(|s| s.to_string()).collect()),
        stocks,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_grid() -> Value {
        json!([
            [["600000.SH", "20240115", 10.0, 10.6, 9.8, 10.5, 10.2, 2.94, 1000000, 1.05e9, 0.8, 10.3, 10.1, 9.2, 8.7]],
            [["000001.SZ", "2024-01-15", "11.2", "11.9", "11.0", "11.1", "11.3", "-1.77", "250000", null, null, null, null, null, null]]
        ])
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("20240115"), "2024-01-15");
        assert_eq!(format_date("2024-01-15"), "2024-01-15");
        assert_eq!(format_date("2024011"), "2024011");
        assert_eq!(format_date(""), "");
    }

    #[test]
    fn test_decode_default_schema() {
        let grid = sample_grid();
        let stocks = decode_grid(Some(&grid), None);
        assert_eq!(stocks.len(), 2);

        let a = &stocks[0];
        assert_eq!(a.ts_code, "600000.SH");
        assert_eq!(a.trade_date, "20240115");
        assert_eq!(a.open, Some(10.0));
        assert_eq!(a.close, Some(10.5));
        assert_eq!(a.vol, Some(1_000_000.0));
        assert_eq!(a.ma120, Some(9.2));
        assert_eq!(a.half_year_line, Some(9.2));
        assert_eq!(a.year_line, Some(8.7));

        let b = &stocks[1];
        assert_eq!(b.open, Some(11.2));
        assert_eq!(b.pct_chg, Some(-1.77));
        assert_eq!(b.amount, None);
        assert_eq!(b.half_year_line, None);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let grid = sample_grid();
        assert_eq!(decode_grid(Some(&grid), None), decode_grid(Some(&grid), None));
    }

    #[test]
    fn test_missing_or_empty_grid() {
        assert!(decode_grid(None, None).is_empty());
        assert!(decode_grid(Some(&json!([])), None).is_empty());
        assert!(decode_grid(Some(&json!(null)), None).is_empty());
        assert!(decode_grid(Some(&json!({"oops": 1})), None).is_empty());

        let page = decode_response(&json!({"stock_count": 0}));
        assert!(page.stocks.is_empty());
        assert_eq!(page.stock_count, 0);
    }

    #[test]
    fn test_extra_values_dropped_and_unknown_names_kept() {
        let names = vec!["tsCode".to_string(), "close".to_string(), "sector".to_string()];
        let grid = json!([[["600000", 10.5, "bank", 42, 43]]]);

        let stocks = decode_grid(Some(&grid), Some(names.as_slice()));
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].ts_code, "600000");
        assert_eq!(stocks[0].close, Some(10.5));
        assert_eq!(stocks[0].extra.get("sector"), Some(&json!("bank")));
        assert_eq!(stocks[0].extra.len(), 1);
        // no ma120/ma250 columns → no aliases
        assert_eq!(stocks[0].half_year_line, None);
        assert_eq!(stocks[0].year_line, None);
    }

    #[test]
    fn test_skips_stocks_without_rows() {
        let grid = json!([[], null, [["600000", "20240115"]]]);
        let stocks = decode_grid(Some(&grid), None);
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].close, None);
    }

    #[test]
    fn test_multi_row_history_uses_first_row() {
        let grid = json!([[
            ["600000", "20240112", 9.9, 10.1, 9.7, 10.0],
            ["600000", "20240115", 10.0, 10.6, 9.8, 10.5]
        ]]);
        let stocks = decode_grid(Some(&grid), None);
        assert_eq!(stocks[0].trade_date, "20240112");
    }

    #[test]
    fn test_decode_response_fields() {
        let body = json!({
            "stock_count": 123,
            "date": "20240115",
            "page": 2,
            "column_names": DEFAULT_COLUMNS,
            "grid_data": sample_grid(),
        });
        let page = decode_response(&body);
        assert_eq!(page.stock_count, 123);
        assert_eq!(page.date.as_deref(), Some("20240115"));
        assert_eq!(page.page, Some(2));
        assert_eq!(page.stocks.len(), 2);
        assert_eq!(page.column_names.len(), 15);
    }
}
