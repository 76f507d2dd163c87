//! Output side of the dashboard: where chart options end up.

pub mod html;
pub mod table;

use crate::chart::ChartConfig;

pub use self::html::HtmlPage;

/// Identifies one live chart instance on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChartHandle(pub u64);

/// Everything a surface needs to show one stock card.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartMount {
    /// Display node, `chart-{index}`.
    pub node: String,
    pub config: ChartConfig,
    /// Opened when the card is clicked.
    pub fullscreen: ChartConfig,
    /// Pre-rendered tooltip text per category.
    pub tooltips: Vec<String>,
}

/// A charting backend. Each mounted chart owns a click action and a resize
/// listener; `dispose` must release both along with the instance.
pub trait ChartSurface: Send {
    fn mount(&mut self, chart: ChartMount) -> ChartHandle;
    fn dispose(&mut self, handle: ChartHandle);
}
