use crate::models::{QueryMode, StockPage, StockQuery, StockSnapshot};
use crate::utils::fmt_rate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Tab {
    #[default]
    Table,
    Chart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient message for the user (the browser showed these as toasts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Counters shown above the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_count: u64,
    pub limit_up_count: u64,
    pub limit_down_count: u64,
    /// Stocks on the current page with `pct_chg > 0`.
    pub positive_count: usize,
    /// Stocks on the current page with `pct_chg < 0`.
    pub negative_count: usize,
    pub page_len: usize,
}

impl Summary {
    pub fn from_page(mode: QueryMode, page: &StockPage) -> Self {
        let total = page.stock_count;
        let changes = page.stocks.iter().filter_map(|s| s.pct_chg);

        Self {
            total_count: total,
            limit_up_count: if mode == QueryMode::LimitUp { total } else { 0 },
            limit_down_count: if mode == QueryMode::LimitDown { total } else { 0 },
            positive_count: changes.clone().filter(|c| *c > 0.0).count(),
            negative_count: changes.filter(|c| *c < 0.0).count(),
            page_len: page.stocks.len(),
        }
    }

    pub fn positive_rate(&self) -> String {
        fmt_rate(self.positive_count, self.page_len)
    }

    pub fn negative_rate(&self) -> String {
        fmt_rate(self.negative_count, self.page_len)
    }
}

/// All mutable view state, owned by the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewState {
    /// The query the user asked for most recently.
    pub query: StockQuery,
    pub tab: Tab,
    pub loading: bool,
    pub summary: Summary,
    pub stocks: Vec<StockSnapshot>,
    pub notices: Vec<Notice>,
    /// Sequence number of the request whose result is on screen.
    pub shown_request: u64,
    /// Mode of the result on screen; charts are styled by it.
    pub shown_mode: QueryMode,
}

impl ViewState {
    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            message: message.into(),
        });
    }

    /// Drain pending notices, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
