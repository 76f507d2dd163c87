//! Stock snapshot dashboard: fetch a page of snapshots, expand each into a
//! synthetic 41-day K-line window and render it as an ECharts option.

pub mod api;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod decoder;
pub mod error;
pub mod models;
pub mod render;
pub mod series;
pub mod utils;
