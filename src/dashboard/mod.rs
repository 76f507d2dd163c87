//! Query orchestrator: query → fetch → decode → expand → chart → mount.
//!
//! ## Request ordering
//!
//! Every load takes the next number from a monotonic counter in [`begin`].
//! When its response arrives, [`complete`] compares that number with the
//! counter: if a newer request has been issued since, the response is
//! dropped whether it succeeded or failed. Only the newest request can touch
//! [`ViewState`] or the chart board.
//!
//! [`begin`]: Dashboard::begin
//! [`complete`]: Dashboard::complete

pub mod board;
pub mod state;

use crate::api::StockApi;
use crate::chart::{build_chart, build_fullscreen_chart};
use crate::decoder::decode_response;
use crate::error::{ApiError, LoadError};
use crate::models::{PageRequest, QueryMode, StockFilter, StockQuery};
use crate::render::{ChartMount, ChartSurface};
use crate::series::{NoiseSource, build_series};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub use self::board::ChartBoard;
pub use self::state::{Notice, NoticeLevel, Summary, Tab, ViewState};

/// Proof that a request was issued, carrying its sequence number.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    pub id: u64,
    pub query: StockQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { stocks: usize, charts: usize },
    Empty,
    Failed,
    /// A newer request was issued before this one finished.
    Stale,
}

pub struct Dashboard<S: ChartSurface> {
    api: Arc<dyn StockApi>,
    state: Mutex<ViewState>,
    board: Mutex<ChartBoard<S>>,
    noise: Mutex<Box<dyn NoiseSource>>,
    seq: AtomicU64,
}

impl<S: ChartSurface> Dashboard<S> {
    /// `page` is where the first search or list query starts.
    pub fn new(api: Arc<dyn StockApi>, surface: S, noise: Box<dyn NoiseSource>, page: PageRequest) -> Self {
        let state = ViewState {
            query: StockQuery::new(QueryMode::Normal, page),
            ..Default::default()
        };

        Self {
            api,
            state: Mutex::new(state),
            board: Mutex::new(ChartBoard::new(surface)),
            noise: Mutex::new(noise),
            seq: AtomicU64::new(0),
        }
    }

    // A panic elsewhere must not take the view down with it.
    fn lock_state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_board(&self) -> MutexGuard<'_, ChartBoard<S>> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current view state.
    pub fn state(&self) -> ViewState {
        self.lock_state().clone()
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        self.lock_state().take_notices()
    }

    pub fn with_board<R>(&self, f: impl FnOnce(&ChartBoard<S>) -> R) -> R {
        f(&self.lock_board())
    }

    // ── User actions ─────────────────────────────────────────────────────────

    /// All-stocks search with the given filter, on the current page.
    pub async fn search(&self, filter: StockFilter) -> LoadOutcome {
        let page = self.lock_state().query.page;
        self.run(StockQuery {
            mode: QueryMode::Normal,
            filter,
            page,
        })
        .await
    }

    /// Switch to one of the list queries, keeping the current page.
    pub async fn load_mode(&self, mode: QueryMode) -> LoadOutcome {
        let current = self.lock_state().query.clone();
        let filter = if mode == QueryMode::Normal {
            current.filter
        } else {
            StockFilter::default()
        };
        self.run(StockQuery {
            mode,
            filter,
            page: current.page,
        })
        .await
    }

    /// Re-issue the current query for another page.
    pub async fn goto_page(&self, num: u32) -> LoadOutcome {
        let mut query = self.lock_state().query.clone();
        query.page.num = num.max(1);
        self.run(query).await
    }

    /// Clear the search form and load page 1 of all stocks.
    pub async fn reset(&self) -> LoadOutcome {
        let size = self.lock_state().query.page.size;
        self.run(StockQuery::new(QueryMode::Normal, PageRequest::first(size)))
            .await
    }

    /// Change the visible tab; switching to the chart tab renders the
    /// current stocks.
    pub async fn switch_tab(&self, tab: Tab) -> usize {
        self.lock_state().tab = tab;
        if tab != Tab::Chart {
            return 0;
        }
        tokio::task::yield_now().await;
        self.render_charts()
    }

    // ── Request lifecycle ────────────────────────────────────────────────────

    /// Fetch and apply one query.
    pub async fn run(&self, query: StockQuery) -> LoadOutcome {
        let ticket = self.begin(query);
        let result = self.api.fetch(&ticket.query).await;
        self.complete(ticket, result).await
    }

    /// Register a new request; it supersedes every earlier one.
    pub fn begin(&self, query: StockQuery) -> RequestTicket {
        // numbering and the query write happen under one guard, so the
        // newest ticket always matches `state.query`
        let mut state = self.lock_state();
        let id = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("request #{}: {} page {}", id, query.mode, query.page.num);

        state.query = query.clone();
        state.loading = true;
        RequestTicket { id, query }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.seq.load(Ordering::SeqCst) == ticket.id
    }

    /// Apply a response. Stale responses are dropped without touching state.
    ///
    /// Staleness is re-checked while holding the state lock that [`begin`]
    /// takes, so a request issued after that point cannot be overwritten.
    ///
    /// [`begin`]: Dashboard::begin
    pub async fn complete(&self, ticket: RequestTicket, result: Result<Value, ApiError>) -> LoadOutcome {
        if !self.is_current(&ticket) {
            debug!("request #{} superseded, dropping response", ticket.id);
            return LoadOutcome::Stale;
        }
        let mode = ticket.query.mode;

        let page = match result {
            Ok(body) => decode_response(&body),
            Err(source) => {
                let err = LoadError::Transport { mode, source };
                let mut state = self.lock_state();
                if !self.is_current(&ticket) {
                    debug!("request #{} superseded, dropping error", ticket.id);
                    return LoadOutcome::Stale;
                }
                warn!("{}", err);
                state.loading = false;
                state.notify(NoticeLevel::Error, err.to_string());
                return LoadOutcome::Failed;
            }
        };
        let count = page.stocks.len();
        let total = page.stock_count;

        {
            // board before state, the order `render_charts` uses
            let mut board = self.lock_board();
            let mut state = self.lock_state();
            if !self.is_current(&ticket) {
                debug!("request #{} superseded while decoding, dropping response", ticket.id);
                return LoadOutcome::Stale;
            }

            state.loading = false;
            state.summary = Summary::from_page(mode, &page);
            state.stocks = page.stocks;
            state.shown_request = ticket.id;
            state.shown_mode = mode;

            if count == 0 {
                let err = LoadError::Empty { mode };
                warn!("{}", err);
                state.notify(NoticeLevel::Warning, err.to_string());
                board.clear();
                return LoadOutcome::Empty;
            }
        }

        info!("request #{}: {} stocks ({} total)", ticket.id, count, total);

        // let the view settle before drawing into it
        tokio::task::yield_now().await;
        if !self.is_current(&ticket) {
            // the newer request draws its own result
            return LoadOutcome::Loaded { stocks: count, charts: 0 };
        }
        let charts = self.render_charts();

        LoadOutcome::Loaded { stocks: count, charts }
    }

    /// Build and mount one chart per shown stock. Does nothing unless the
    /// chart tab is active.
    pub fn render_charts(&self) -> usize {
        // held for the whole pass so two passes cannot interleave their mounts
        let mut board = self.lock_board();
        let (stocks, mode) = {
            let state = self.lock_state();
            if state.tab != Tab::Chart {
                return 0;
            }
            (state.stocks.clone(), state.shown_mode)
        };

        let mounts: Vec<ChartMount> = {
            let mut noise = self.noise.lock().unwrap_or_else(PoisonError::into_inner);
            stocks
                .iter()
                .enumerate()
                .map(|(i, stock)| {
                    let series = build_series(stock, noise.as_mut());
                    let config = build_chart(&series, stock, mode);
                    ChartMount {
                        node: format!("chart-{}", i),
                        tooltips: config.tooltips(),
                        fullscreen: build_fullscreen_chart(&series, stock, mode),
                        config,
                    }
                })
                .collect()
        };

        board.replace_all(mounts)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::board::tests::RecordingSurface;
    use super::*;
    use crate::chart::HALF_YEAR_NAME;
    use crate::series::FixedNoise;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    type Responder = Box<dyn Fn(&StockQuery) -> Option<Value> + Send + Sync>;

    /// Answers from a closure; `None` becomes a transport error. Page 1 can
    /// be delayed to force out-of-order completion.
    struct FakeApi {
        respond: Responder,
        slow_first_page: bool,
        calls: Mutex<Vec<StockQuery>>,
    }

    impl FakeApi {
        fn new(respond: impl Fn(&StockQuery) -> Option<Value> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                respond: Box::new(respond),
                slow_first_page: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<StockQuery> {
            self.calls.lock().expect("calls").clone()
        }
    }

    #[async_trait]
    impl StockApi for FakeApi {
        async fn fetch(&self, query: &StockQuery) -> Result<Value, ApiError> {
            self.calls.lock().expect("calls").push(query.clone());
            if self.slow_first_page && query.page.num == 1 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            (self.respond)(query).ok_or_else(transport_error)
        }
    }

    fn transport_error() -> ApiError {
        ApiError::from(serde_json::from_str::<Value>("<html>").unwrap_err())
    }

    fn row(code: &str, pct: f64) -> Value {
        json!([[code, "20240115", 10.0, 10.6, 9.8, 10.5, 10.2, pct, 1000000, 1.0e7, 0.8, 10.3, 10.1, 9.2, 8.7]])
    }

    fn body(codes: &[&str]) -> Value {
        let grid: Vec<Value> = codes.iter().map(|c| row(c, 1.5)).collect();
        json!({ "stock_count": codes.len() * 10, "grid_data": grid })
    }

    fn dashboard(api: Arc<dyn StockApi>) -> Dashboard<RecordingSurface> {
        Dashboard::new(api, RecordingSurface::default(), Box::new(FixedNoise::constant(0.5)), PageRequest::default())
    }

    fn mounted(d: &Dashboard<RecordingSurface>) -> usize {
        d.with_board(|b| b.surface().mounted.len())
    }

    #[tokio::test]
    async fn test_load_then_switch_to_chart_tab() {
        let d = dashboard(FakeApi::new(|_| Some(body(&["600000", "600001"]))));

        let outcome = d.reset().await;
        assert_eq!(outcome, LoadOutcome::Loaded { stocks: 2, charts: 0 });

        let state = d.state();
        assert!(!state.loading);
        assert_eq!(state.stocks.len(), 2);
        assert_eq!(state.summary.total_count, 20);
        assert_eq!(state.summary.positive_rate(), "100.00%");
        assert_eq!(mounted(&d), 0);

        assert_eq!(d.switch_tab(Tab::Chart).await, 2);
        assert_eq!(d.with_board(|b| b.live_count()), 2);
    }

    #[tokio::test]
    async fn test_rerender_releases_previous_charts() {
        let d = dashboard(FakeApi::new(|q| {
            Some(if q.page.num == 1 { body(&["a", "b", "c"]) } else { body(&["d"]) })
        }));
        d.switch_tab(Tab::Chart).await;

        d.reset().await;
        assert_eq!(d.with_board(|b| b.live_count()), 3);

        d.goto_page(2).await;
        d.with_board(|b| {
            assert_eq!(b.live_count(), 1);
            assert_eq!(b.surface().alive.len(), 1);
            assert_eq!(b.surface().disposed.len(), 3);
        });
    }

    #[tokio::test]
    async fn test_empty_result_notifies_without_charts() {
        let d = dashboard(FakeApi::new(|_| Some(json!({ "stock_count": 0, "grid_data": [] }))));
        d.switch_tab(Tab::Chart).await;

        assert_eq!(d.load_mode(QueryMode::LimitDown).await, LoadOutcome::Empty);
        assert_eq!(mounted(&d), 0);

        let notices = d.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert_eq!(notices[0].message, "No limit-down data found");
    }

    #[tokio::test]
    async fn test_missing_grid_counts_as_empty() {
        let d = dashboard(FakeApi::new(|_| Some(json!({}))));
        assert_eq!(d.reset().await, LoadOutcome::Empty);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_previous_view() {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&fail);
        let d = dashboard(FakeApi::new(move |_| {
            (!flag.load(Ordering::SeqCst)).then(|| body(&["600000"]))
        }));

        d.reset().await;
        fail.store(true, Ordering::SeqCst);
        assert_eq!(d.goto_page(2).await, LoadOutcome::Failed);

        let state = d.state();
        assert!(!state.loading);
        assert_eq!(state.stocks.len(), 1);
        assert_eq!(state.notices.len(), 1);
        assert_eq!(state.notices[0].level, NoticeLevel::Error);
        assert!(state.notices[0].message.starts_with("Failed to load stock data"));
    }

    #[tokio::test]
    async fn test_stale_response_is_dropped() {
        let d = dashboard(FakeApi::new(|_| None));

        let older = d.begin(StockQuery::new(QueryMode::LimitUp, PageRequest::default()));
        let newer = d.begin(StockQuery::new(QueryMode::YearLine, PageRequest::default()));
        assert!(!d.is_current(&older));

        let newer_id = newer.id;
        assert_eq!(
            d.complete(newer, Ok(body(&["new"]))).await,
            LoadOutcome::Loaded { stocks: 1, charts: 0 }
        );
        assert_eq!(d.complete(older, Ok(body(&["old1", "old2"]))).await, LoadOutcome::Stale);

        let state = d.state();
        assert_eq!(state.stocks[0].ts_code, "new");
        assert_eq!(state.shown_request, newer_id);
        assert_eq!(state.shown_mode, QueryMode::YearLine);
    }

    #[tokio::test]
    async fn test_stale_failure_is_silent() {
        let d = dashboard(FakeApi::new(|_| None));
        let older = d.begin(StockQuery::default());
        let _newer = d.begin(StockQuery::default());

        assert_eq!(d.complete(older, Err(transport_error())).await, LoadOutcome::Stale);
        let state = d.state();
        assert!(state.notices.is_empty());
        assert!(state.loading);
    }

    #[tokio::test]
    async fn test_overlapping_loads_newest_wins() {
        let api = Arc::new(FakeApi {
            respond: Box::new(|q: &StockQuery| Some(if q.page.num == 1 { body(&["slow"]) } else { body(&["fast"]) })),
            slow_first_page: true,
            calls: Mutex::new(Vec::new()),
        });
        let d = dashboard(api);

        let (first, second) = tokio::join!(d.goto_page(1), d.goto_page(2));
        assert_eq!(first, LoadOutcome::Stale);
        assert!(matches!(second, LoadOutcome::Loaded { stocks: 1, .. }));
        assert_eq!(d.state().stocks[0].ts_code, "fast");
    }

    #[tokio::test]
    async fn test_page_change_keeps_mode() {
        let api = FakeApi::new(|_| Some(body(&["600000"])));
        let d = dashboard(api.clone());

        d.load_mode(QueryMode::LimitUp).await;
        d.goto_page(3).await;

        let last = api.calls().pop().expect("a call");
        assert_eq!(last.mode, QueryMode::LimitUp);
        assert_eq!(last.page, PageRequest { num: 3, size: 9 });
        assert_eq!(d.state().summary.limit_up_count, 10);
    }

    #[tokio::test]
    async fn test_search_and_reset() {
        let api = FakeApi::new(|_| Some(body(&["600000"])));
        let d = dashboard(api.clone());

        d.goto_page(4).await;
        let filter = StockFilter {
            ts_code: Some("600000".into()),
            ..Default::default()
        };
        d.search(filter.clone()).await;
        let q = d.state().query;
        assert_eq!(q.filter, filter);
        assert_eq!(q.page.num, 4);

        d.reset().await;
        let q = d.state().query;
        assert_eq!(q.mode, QueryMode::Normal);
        assert_eq!(q.page.num, 1);
        assert!(q.filter.is_empty());
        assert_eq!(api.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_half_year_mode_adds_reference_line() {
        let d = Dashboard::new(
            FakeApi::new(|_| Some(body(&["600000"]))),
            crate::render::HtmlPage::new("echarts.js"),
            Box::new(FixedNoise::constant(0.5)),
            PageRequest::default(),
        );
        d.switch_tab(Tab::Chart).await;
        d.load_mode(QueryMode::HalfYearLine).await;

        d.with_board(|b| {
            let handle = b.handle_for("chart-0").expect("mounted");
            let mount = b.surface().get(handle).expect("mount");
            assert!(mount.config.find_series(HALF_YEAR_NAME).is_some());
            assert!(mount.fullscreen.find_series(HALF_YEAR_NAME).is_some());
            assert_eq!(mount.tooltips.len(), 41);
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_decode_never_overwrites_newer_result() {
        let d = Arc::new(dashboard(FakeApi::new(|_| None)));
        let codes: Vec<String> = (0..20_000).map(|i| format!("old-{}", i)).collect();
        let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
        let big = body(&refs);

        for _ in 0..20 {
            let older = d.begin(StockQuery::new(QueryMode::LimitUp, PageRequest::default()));

            let other = Arc::clone(&d);
            let newer = std::thread::spawn(move || {
                let ticket = other.begin(StockQuery::new(QueryMode::YearLine, PageRequest::default()));
                let id = ticket.id;
                (id, tokio_test::block_on(other.complete(ticket, Ok(body(&["new"])))))
            });

            let older_outcome = d.complete(older, Ok(big.clone())).await;
            let (newer_id, newer_outcome) = newer.join().expect("newer request thread");

            assert_eq!(newer_outcome, LoadOutcome::Loaded { stocks: 1, charts: 0 });
            assert!(matches!(older_outcome, LoadOutcome::Stale | LoadOutcome::Loaded { .. }));

            let state = d.state();
            assert_eq!(state.shown_request, newer_id);
            assert_eq!(state.stocks.len(), 1);
            assert_eq!(state.stocks[0].ts_code, "new");
            assert_eq!(state.shown_mode, QueryMode::YearLine);
        }
    }

    #[test]
    fn test_concurrent_begins_keep_newest_query() {
        let d = Arc::new(dashboard(FakeApi::new(|_| None)));

        let handles: Vec<_> = (1..=8u32)
            .map(|num| {
                let d = Arc::clone(&d);
                std::thread::spawn(move || d.begin(StockQuery::new(QueryMode::LimitDown, PageRequest { num, size: 9 })))
            })
            .collect();
        let tickets: Vec<RequestTicket> = handles
            .into_iter()
            .map(|h| h.join().expect("begin thread"))
            .collect();

        let newest = tickets.iter().max_by_key(|t| t.id).expect("a ticket");
        assert!(d.is_current(newest));
        assert_eq!(d.state().query, newest.query);
    }
}
