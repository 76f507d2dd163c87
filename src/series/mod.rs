//! Expands one real snapshot into a 41-day candlestick window.
//!
//! Day 0 is the snapshot itself. The 20 days either side are synthesised by
//! perturbing the snapshot close and volume with draws from a
//! [`NoiseSource`], then MA5/MA10/MA20/MA60 are computed over the result.
//! The default source is entropy-seeded, so two builds of the same stock
//! differ; tests inject a fixed stream instead.

use crate::decoder::format_date;
use crate::models::{DayBar, StockSnapshot, SyntheticSeries};
use crate::utils::round_to;
use chrono::{NaiveDate, TimeDelta};
use rand::SeedableRng;
use rand::distr::{Distribution, StandardUniform};
use rand::rngs::StdRng;

/// Days synthesised on each side of the trade date.
pub const WINDOW_RADIUS: i64 = 20;
/// Total bars per series.
pub const WINDOW_LEN: usize = (2 * WINDOW_RADIUS + 1) as usize;

// Perturbation bounds.
const OPEN_SWING: f64 = 0.05;
const CLOSE_SWING: f64 = 0.03;
const WICK_SWING: f64 = 0.02;
const VOLUME_FLOOR: f64 = 0.7;
const VOLUME_SPAN: f64 = 0.6;

// MA60 cannot be computed exactly over 41 bars; it averages at most this many.
const MA60_SPAN: usize = 40;
const MA60_FIRST_INDEX: usize = 19;

// ── Noise ─────────────────────────────────────────────────────────────────────

/// Supplier of uniform draws in `[0, 1)`.
pub trait NoiseSource: Send {
    fn next_unit(&mut self) -> f64;
}

/// `rand`-backed noise. Entropy-seeded unless built with [`RandomNoise::seeded`].
pub struct RandomNoise {
    rng: StdRng,
}

impl RandomNoise {
    pub fn new() -> Self {
        Self::seeded(rand::random())
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseSource for RandomNoise {
    fn next_unit(&mut self) -> f64 {
        StandardUniform.sample(&mut self.rng)
    }
}

/// Cycles through a fixed list of draws. Every value is clamped into `[0, 1)`.
#[derive(Debug, Clone)]
pub struct FixedNoise {
    values: Vec<f64>,
    pos: usize,
}

impl FixedNoise {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, pos: 0 }
    }

    /// Always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl NoiseSource for FixedNoise {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let v = self.values[self.pos % self.values.len()];
        self.pos += 1;
        v.clamp(0.0, 1.0 - f64::EPSILON)
    }
}

/// Uniform draw in `[low, high)`.
fn uniform(noise: &mut dyn NoiseSource, low: f64, high: f64) -> f64 {
    low + noise.next_unit() * (high - low)
}

// ── Dates ─────────────────────────────────────────────────────────────────────

fn parse_trade_date(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    NaiveDate::parse_from_str(date, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
        .ok()
}

/// Calendar-day labels for offsets −20…+20. Unparseable dates fall back to
/// `T-20`…`T+20` with the raw date at day 0.
pub fn window_dates(trade_date: &str) -> Vec<String> {
    let base = parse_trade_date(trade_date);

    (-WINDOW_RADIUS..=WINDOW_RADIUS)
        .map(|offset| {
            let shifted = base.and_then(|d| d.checked_add_signed(TimeDelta::days(offset)));
            match (shifted, offset) {
                (Some(d), _) => d.format("%Y-%m-%d").to_string(),
                (None, 0) => format_date(trade_date),
                (None, _) => format!("T{:+}", offset),
            }
        })
        .collect()
}

// ── Moving averages ───────────────────────────────────────────────────────────

/// Trailing simple mean over `window` closes, rounded to 2 decimals; `None`
/// until `window` bars exist.
pub fn moving_average(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            let sum: f64 = closes[i + 1 - window..=i].iter().sum();
            Some(round_to(sum / window as f64, 2))
        })
        .collect()
}

/// Stand-in for MA60 over a short window: from index 19 on, the mean of the
/// last `min(i + 1, 40)` closes.
pub fn approx_ma60(closes: &[f64]) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            if i < MA60_FIRST_INDEX {
                return None;
            }
            let start = (i + 1).saturating_sub(MA60_SPAN);
            let slice = &closes[start..=i];
            let sum: f64 = slice.iter().sum();
            Some(round_to(sum / slice.len() as f64, 2))
        })
        .collect()
}

// ── Builder ───────────────────────────────────────────────────────────────────

fn synthetic_bar(date: String, base_close: f64, base_vol: f64, noise: &mut dyn NoiseSource) -> DayBar {
    let swing = uniform(noise, 1.0 - OPEN_SWING, 1.0 + OPEN_SWING);
    let open = round_to(base_close * swing, 2);
    let close = round_to(
        base_close * swing * uniform(noise, 1.0 - CLOSE_SWING, 1.0 + CLOSE_SWING),
        2,
    );
    let low = round_to(open.min(close) * (1.0 - uniform(noise, 0.0, WICK_SWING)), 2);
    let high = round_to(open.max(close) * (1.0 + uniform(noise, 0.0, WICK_SWING)), 2);
    let volume = round_to(
        base_vol * uniform(noise, VOLUME_FLOOR, VOLUME_FLOOR + VOLUME_SPAN),
        0,
    );

    DayBar {
        date,
        open,
        close,
        low,
        high,
        volume,
        synthetic: true,
    }
}

/// Build the 41-bar window around `stock`. Missing prices become NaN and
/// propagate into every derived value.
pub fn build_series(stock: &StockSnapshot, noise: &mut dyn NoiseSource) -> SyntheticSeries {
    let nan = f64::NAN;
    let base_close = stock.close.unwrap_or(nan);
    let base_vol = stock.vol.unwrap_or(nan);

    let bars: Vec<DayBar> = window_dates(&stock.trade_date)
        .into_iter()
        .zip(-WINDOW_RADIUS..=WINDOW_RADIUS)
        .map(|(date, offset)| {
            if offset == 0 {
                DayBar {
                    date,
                    open: stock.open.unwrap_or(nan),
                    close: base_close,
                    low: stock.low.unwrap_or(nan),
                    high: stock.high.unwrap_or(nan),
                    volume: base_vol,
                    synthetic: false,
                }
            } else {
                synthetic_bar(date, base_close, base_vol, noise)
            }
        })
        .collect();

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    SyntheticSeries {
        ma5: moving_average(&closes, 5),
        ma10: moving_average(&closes, 10),
        ma20: moving_average(&closes, 20),
        ma60: approx_ma60(&closes),
        bars,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
