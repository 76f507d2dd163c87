use std::time::{Duration, Instant};
use tracing::info;

/// Wall-clock timer that logs how long a dashboard step took when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Format a large integer with thousands separators.
pub fn fmt_number(n: i64) -> String {
    let s = n.abs().to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}

/// Round to a fixed number of decimals, the way prices are displayed.
/// NaN and infinities pass through untouched.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Render an optional number for text output: `-` when missing or NaN.
pub fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format_trimmed(v),
        _ => "-".to_string(),
    }
}

/// Shortest decimal form: `10.0` → "10", `10.50` → "10.5".
pub fn format_trimmed(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// `part / whole` as a percentage string with two decimals; "0.00%" when
/// `whole` is zero.
pub fn fmt_rate(part: usize, whole: usize) -> String {
    if whole == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", part as f64 / whole as f64 * 100.0)
}
