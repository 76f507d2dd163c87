//! Data grid export: one CSV row per stock.

use crate::decoder::format_date;
use crate::models::StockSnapshot;
use crate::utils::fmt_opt;
use anyhow::Result;
use std::io::Write;

const HEADER: [&str; 15] = [
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

/// Write the grid with dates normalised to `YYYY-MM-DD` and missing values
/// shown as `-`.
pub fn write_grid<W: Write>(out: W, stocks: &[StockSnapshot]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADER)?;

    for s in stocks {
        let numbers = [
            s.open,
            s.high,
            s.low,
            s.close,
            s.pre_close,
            s.pct_chg,
            s.vol,
            s.amount,
            s.turnover_rate,
            s.ma5,
            s.ma10,
            s.ma120,
            s.ma250,
        ];
        let mut record = vec![s.ts_code.clone(), format_date(&s.trade_date)];
        record.extend(numbers.into_iter().map(fmt_opt));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
