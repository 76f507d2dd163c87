//! ECharts option builder for one stock card.
//!
//! The option is plain data: everything the browser would compute with a
//! callback (per-bar volume colour, tooltip text) is resolved here.

use crate::decoder::format_date;
use crate::models::{QueryMode, StockSnapshot, SyntheticSeries};
use crate::utils::{fmt_opt, format_trimmed};
use serde::Serialize;

pub const UP_COLOR: &str = "#FD1050";
pub const DOWN_COLOR: &str = "#0CF49B";
pub const FLAT_COLOR: &str = "#999";

pub const CANDLE_NAME: &str = "K-Line";
pub const VOLUME_NAME: &str = "Volume";
pub const HALF_YEAR_NAME: &str = "Half-year line";
pub const YEAR_NAME: &str = "Year line";

const MA_LINES: [(&str, &str); 4] = [
    ("MA5", "#DA9D54"),
    ("MA10", "#39AAFD"),
    ("MA20", "#B833FF"),
    ("MA60", "#29C77E"),
];

// ── Option types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub background_color: &'static str,
    pub animation: bool,
    pub title: Title,
    pub tooltip: Tooltip,
    pub axis_pointer: AxisPointerLink,
    pub legend: Legend,
    pub grid: Vec<Grid>,
    pub x_axis: Vec<Axis>,
    pub y_axis: Vec<Axis>,
    pub data_zoom: Vec<DataZoom>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Title {
    pub text: String,
    pub subtext: String,
    pub left: &'static str,
    pub text_style: TextStyle,
    pub subtext_style: TextStyle,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tooltip {
    pub trigger: &'static str,
    pub axis_pointer: TooltipPointer,
    pub background_color: &'static str,
    pub border_width: u32,
    pub border_color: &'static str,
    pub padding: u32,
    pub text_style: TextStyle,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TooltipPointer {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub line_style: LineStyle,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AxisPointerLink {
    pub link: Vec<serde_json::Value>,
    pub label: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Legend {
    pub data: Vec<String>,
    pub top: u32,
    #[serde(
        rename = "selected",
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "selected_map"
    )]
    pub deselected: Vec<String>,
    pub text_style: TextStyle,
}

/// ECharts wants `selected: { name: false }`.
fn selected_map<S: serde::Serializer>(names: &[String], s: S) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut map = s.serialize_map(Some(names.len()))?;
    for name in names {
        map.serialize_entry(name, &false)?;
    }
    map.end()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Grid {
    pub left: &'static str,
    pub right: &'static str,
    pub top: &'static str,
    pub height: &'static str,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_gap: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_number: Option<u32>,
    pub axis_label: AxisLabel,
    pub split_line: SplitLine,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AxisLabel {
    pub show: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SplitLine {
    pub show: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_style: Option<LineStyle>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataZoom {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x_axis_index: [u32; 2],
    pub start: u32,
    pub end: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color0: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_color: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_color0: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Candlestick,
    Line,
    Bar,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VolumeBar {
    /// `[open, close, volume]`
    pub value: [f64; 3],
    #[serde(rename = "itemStyle")]
    pub item_style: ItemStyle,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SeriesData {
    Candles(Vec<[f64; 4]>),
    Line(Vec<Option<f64>>),
    Volume(Vec<VolumeBar>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SeriesKind,
    pub data: SeriesData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_axis_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_axis_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smooth: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_symbol: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_style: Option<LineStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_style: Option<ItemStyle>,
}

impl Series {
    fn line(name: &str, data: Vec<Option<f64>>, style: LineStyle) -> Self {
        Self {
            name: name.to_string(),
            kind: SeriesKind::Line,
            data: SeriesData::Line(data),
            x_axis_index: None,
            y_axis_index: None,
            smooth: Some(true),
            show_symbol: Some(false),
            line_style: Some(style),
            item_style: None,
        }
    }

    fn is_moving_average(&self) -> bool {
        self.kind == SeriesKind::Line && self.name.starts_with("MA")
    }
}

// ── Layout presets ────────────────────────────────────────────────────────────

/// Card in the 3x3 grid, or the enlarged view opened by clicking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Compact,
    Fullscreen,
}

struct Preset {
    title_size: u32,
    subtitle_size: u32,
    legend_top: u32,
    price_grid: (&'static str, &'static str),
    volume_grid: (&'static str, &'static str),
    zoom: (u32, u32),
    slider_top: &'static str,
    label_color: &'static str,
    label_size: Option<u32>,
    volume_labels: bool,
    hide_slow_averages: bool,
}

impl Layout {
    fn preset(self) -> Preset {
        match self {
            Layout::Compact => Preset {
                title_size: 14,
                subtitle_size: 12,
                legend_top: 30,
                price_grid: ("12%", "58%"),
                volume_grid: ("75%", "15%"),
                zoom: (35, 65),
                slider_top: "92%",
                label_color: "#999",
                label_size: Some(10),
                volume_labels: false,
                hide_slow_averages: true,
            },
            Layout::Fullscreen => Preset {
                title_size: 18,
                subtitle_size: 14,
                legend_top: 50,
                price_grid: ("12%", "60%"),
                volume_grid: ("77%", "15%"),
                zoom: (0, 100),
                slider_top: "95%",
                label_color: "#333",
                label_size: None,
                volume_labels: true,
                hide_slow_averages: false,
            },
        }
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Colour for a percent change: up, down, or neutral when zero or missing.
pub fn price_color(pct_chg: Option<f64>) -> &'static str {
    match pct_chg {
        Some(v) if v > 0.0 => UP_COLOR,
        Some(v) if v < 0.0 => DOWN_COLOR,
        _ => FLAT_COLOR,
    }
}

/// `"2024-01-15 Open:10 Close:10.5 Chg:2.94%"`
pub fn subtitle(stock: &StockSnapshot) -> String {
    format!(
        "{} Open:{} Close:{} Chg:{}%",
        format_date(&stock.trade_date),
        fmt_opt(stock.open),
        fmt_opt(stock.close),
        fmt_opt(stock.pct_chg),
    )
}

/// The constant reference line a query mode asks for, if the stock has one.
fn reference_line(stock: &StockSnapshot, mode: QueryMode) -> Option<(&'static str, &'static str, f64)> {
    let (name, color, value) = match mode {
        QueryMode::HalfYearLine => (HALF_YEAR_NAME, "#F4A225", stock.half_year_line?),
        QueryMode::YearLine => (YEAR_NAME, "#E165FD", stock.year_line?),
        _ => return None,
    };
    // zero and NaN mean "no data" upstream
    (value.is_finite() && value != 0.0).then_some((name, color, value))
}

fn dashed_grid_line() -> SplitLine {
    SplitLine {
        show: true,
        line_style: Some(LineStyle {
            width: None,
            color: Some("#eee"),
            kind: Some("dashed"),
        }),
    }
}

/// Build the card option for one stock.
pub fn build_chart(series: &SyntheticSeries, stock: &StockSnapshot, mode: QueryMode) -> ChartConfig {
    build_with_layout(series, stock, mode, Layout::Compact)
}

/// Build the enlarged option shown when a card is clicked.
pub fn build_fullscreen_chart(series: &SyntheticSeries, stock: &StockSnapshot, mode: QueryMode) -> ChartConfig {
    build_with_layout(series, stock, mode, Layout::Fullscreen)
}

pub fn build_with_layout(
    series: &SyntheticSeries,
    stock: &StockSnapshot,
    mode: QueryMode,
    layout: Layout,
) -> ChartConfig {
    let p = layout.preset();
    let categories = series.categories();

    // ── series ──
    let mut out = vec![Series {
        name: CANDLE_NAME.to_string(),
        kind: SeriesKind::Candlestick,
        data: SeriesData::Candles(series.bars.iter().map(|b| b.candle()).collect()),
        x_axis_index: None,
        y_axis_index: None,
        smooth: None,
        show_symbol: None,
        line_style: None,
        item_style: Some(ItemStyle {
            color: Some(UP_COLOR),
            color0: Some(DOWN_COLOR),
            border_color: Some(UP_COLOR),
            border_color0: Some(DOWN_COLOR),
        }),
    }];

    let averages = [&series.ma5, &series.ma10, &series.ma20, &series.ma60];
    for ((name, color), values) in MA_LINES.iter().zip(averages) {
        out.push(Series::line(
            name,
            values.clone(),
            LineStyle {
                width: Some(1.0),
                color: Some(*color),
                kind: None,
            },
        ));
    }

    out.push(Series {
        name: VOLUME_NAME.to_string(),
        kind: SeriesKind::Bar,
        data: SeriesData::Volume(
            series
                .bars
                .iter()
                .map(|b| VolumeBar {
                    value: [b.open, b.close, b.volume],
                    item_style: ItemStyle {
                        color: Some(if b.is_up() { UP_COLOR } else { DOWN_COLOR }),
                        ..Default::default()
                    },
                })
                .collect(),
        ),
        x_axis_index: Some(1),
        y_axis_index: Some(1),
        smooth: None,
        show_symbol: None,
        line_style: None,
        item_style: None,
    });

    let mut legend: Vec<String> = std::iter::once(CANDLE_NAME)
        .chain(MA_LINES.iter().map(|(name, _)| *name))
        .map(String::from)
        .collect();

    if let Some((name, color, value)) = reference_line(stock, mode) {
        out.push(Series::line(
            name,
            vec![Some(value); categories.len()],
            LineStyle {
                width: Some(1.5),
                color: Some(color),
                kind: Some("dashed"),
            },
        ));
        legend.push(name.to_string());
    }

    // ── axes ──
    let x_axis = vec![
        Axis {
            kind: Some("category"),
            data: Some(categories.clone()),
            boundary_gap: Some(false),
            axis_label: AxisLabel {
                show: true,
                color: Some(p.label_color),
                font_size: p.label_size,
            },
            split_line: dashed_grid_line(),
            min: Some("dataMin"),
            max: Some("dataMax"),
            ..Default::default()
        },
        Axis {
            kind: Some("category"),
            grid_index: Some(1),
            data: Some(categories),
            boundary_gap: Some(false),
            min: Some("dataMin"),
            max: Some("dataMax"),
            ..Default::default()
        },
    ];

    let y_axis = vec![
        Axis {
            scale: Some(true),
            split_number: Some(4),
            axis_label: AxisLabel {
                show: true,
                color: Some(p.label_color),
                font_size: p.label_size,
            },
            split_line: dashed_grid_line(),
            ..Default::default()
        },
        Axis {
            scale: Some(true),
            grid_index: Some(1),
            split_number: Some(2),
            axis_label: AxisLabel {
                show: p.volume_labels,
                color: p.volume_labels.then_some(p.label_color),
                font_size: None,
            },
            ..Default::default()
        },
    ];

    ChartConfig {
        background_color: "#fff",
        animation: false,
        title: Title {
            text: stock.ts_code.clone(),
            subtext: subtitle(stock),
            left: "center",
            text_style: TextStyle {
                font_size: Some(p.title_size),
                font_weight: Some("bold"),
                color: Some("#333"),
            },
            subtext_style: TextStyle {
                font_size: Some(p.subtitle_size),
                font_weight: None,
                color: Some(price_color(stock.pct_chg)),
            },
        },
        tooltip: Tooltip {
            trigger: "axis",
            axis_pointer: TooltipPointer {
                kind: "cross",
                line_style: LineStyle {
                    width: Some(1.0),
                    color: Some("#999"),
                    kind: Some("dashed"),
                },
            },
            background_color: "rgba(255, 255, 255, 0.8)",
            border_width: 1,
            border_color: "#ccc",
            padding: 10,
            text_style: TextStyle {
                color: Some("#000"),
                ..Default::default()
            },
        },
        axis_pointer: AxisPointerLink {
            link: vec![serde_json::json!({ "xAxisIndex": "all" })],
            label: serde_json::json!({ "backgroundColor": "#777" }),
        },
        legend: Legend {
            data: legend,
            top: p.legend_top,
            deselected: if p.hide_slow_averages {
                vec!["MA20".to_string(), "MA60".to_string()]
            } else {
                Vec::new()
            },
            text_style: TextStyle {
                color: Some("#333"),
                ..Default::default()
            },
        },
        grid: vec![
            Grid {
                left: "3%",
                right: "3%",
                top: p.price_grid.0,
                height: p.price_grid.1,
            },
            Grid {
                left: "3%",
                right: "3%",
                top: p.volume_grid.0,
                height: p.volume_grid.1,
            },
        ],
        x_axis,
        y_axis,
        data_zoom: vec![
            DataZoom {
                kind: "inside",
                x_axis_index: [0, 1],
                start: p.zoom.0,
                end: p.zoom.1,
                top: None,
                height: None,
            },
            DataZoom {
                kind: "slider",
                x_axis_index: [0, 1],
                start: p.zoom.0,
                end: p.zoom.1,
                top: Some(p.slider_top),
                height: Some(20),
            },
        ],
        series: out,
    }
}

// ── Tooltip ───────────────────────────────────────────────────────────────────

impl ChartConfig {
    pub fn categories(&self) -> &[String] {
        self.x_axis
            .first()
            .and_then(|a| a.data.as_deref())
            .unwrap_or_default()
    }

    pub fn find_series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }

    /// Tooltip text for one category: date, OHLC of the candle, then each
    /// moving average that has a value there.
    pub fn tooltip(&self, index: usize) -> Option<String> {
        let date = self.categories().get(index)?;
        let candle = self.series.iter().find_map(|s| match &s.data {
            SeriesData::Candles(c) if s.kind == SeriesKind::Candlestick => c.get(index),
            _ => None,
        })?;
        let [open, close, low, high] = *candle;

        let mut lines = vec![
            date.clone(),
            format!("Open: {}", format_trimmed(open)),
            format!("Close: {}", format_trimmed(close)),
            format!("Low: {}", format_trimmed(low)),
            format!("High: {}", format_trimmed(high)),
        ];

        for s in self.series.iter().filter(|s| s.is_moving_average()) {
            if let SeriesData::Line(values) = &s.data
                && let Some(Some(v)) = values.get(index)
                && v.is_finite()
            {
                lines.push(format!("{}: {}", s.name, format_trimmed(*v)));
            }
        }

        Some(lines.join("\n"))
    }

    /// Tooltip text for every category, in axis order.
    pub fn tooltips(&self) -> Vec<String> {
        (0..self.categories().len())
            .map(|i| self.tooltip(i).unwrap_or_default())
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
