use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use stock_dashboard::api::{FixtureApi, HttpStockApi, StockApi};
use stock_dashboard::config::AppConfig;
use stock_dashboard::dashboard::{Dashboard, LoadOutcome, NoticeLevel, Tab};
use stock_dashboard::models::{PageRequest, QueryMode, StockFilter};
use stock_dashboard::render::HtmlPage;
use stock_dashboard::series::{NoiseSource, RandomNoise};
use stock_dashboard::{decoder, render, utils};

#[derive(Parser)]
#[command(name = "stock-dashboard", about = "Stock snapshot dashboard with synthetic K-line charts", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Where to write the HTML dashboard (default from config)
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,

    /// Seed for the synthetic price series
    #[arg(long, global = true, env = "STOCKDASH_SEED")]
    seed: Option<u64>,

    /// Print the data grid as CSV
    #[arg(long, global = true)]
    csv: bool,
}

#[derive(Args, Clone, Copy)]
struct PageArgs {
    /// Page number, starting at 1
    #[arg(short, long, default_value_t = 1)]
    page: u32,

    /// Stocks per page (default from config)
    #[arg(short, long)]
    size: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Query all stocks, optionally filtered
    Data {
        /// Stock code, e.g. 600000.SH
        #[arg(long)]
        ts_code: Option<String>,

        /// Trade date as YYYYMMDD
        #[arg(long)]
        trade_date: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        pct_chg_min: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        pct_chg_max: Option<f64>,

        #[arg(long)]
        price_min: Option<f64>,

        #[arg(long)]
        price_max: Option<f64>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Stocks that closed at the daily limit-up
    LimitUp(PageArgs),

    /// Stocks that closed at the daily limit-down
    LimitDown(PageArgs),

    /// Stocks trading at their half-year (120-day) line
    HalfYearLine(PageArgs),

    /// Stocks trading at their year (250-day) line
    YearLine(PageArgs),

    /// Render a saved API response instead of calling the server
    Replay {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value_t = ModeArg::Normal)]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Normal,
    LimitUp,
    LimitDown,
    HalfYearLine,
    YearLine,
}

impl From<ModeArg> for QueryMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Normal => QueryMode::Normal,
            ModeArg::LimitUp => QueryMode::LimitUp,
            ModeArg::LimitDown => QueryMode::LimitDown,
            ModeArg::HalfYearLine => QueryMode::HalfYearLine,
            ModeArg::YearLine => QueryMode::YearLine,
        }
    }
}

/// What the first load asks for.
enum Request {
    List(QueryMode),
    Search(StockFilter),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "stock_dashboard=info,warn",
        1 => "stock_dashboard=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let default_size = config.api.page_size;
    let page_of = |args: PageArgs| PageRequest {
        num: args.page.max(1),
        size: args.size.unwrap_or(default_size),
    };

    let (api, request, page): (Arc<dyn StockApi>, Request, PageRequest) = match cli.command {
        Command::Data {
            ts_code,
            trade_date,
            pct_chg_min,
            pct_chg_max,
            price_min,
            price_max,
            page,
        } => {
            let filter = StockFilter {
                ts_code,
                trade_date,
                pct_chg_min,
                pct_chg_max,
                price_min,
                price_max,
            };
            (Arc::new(HttpStockApi::new(&config.api)?), Request::Search(filter), page_of(page))
        }
        Command::LimitUp(page) => (
            Arc::new(HttpStockApi::new(&config.api)?),
            Request::List(QueryMode::LimitUp),
            page_of(page),
        ),
        Command::LimitDown(page) => (
            Arc::new(HttpStockApi::new(&config.api)?),
            Request::List(QueryMode::LimitDown),
            page_of(page),
        ),
        Command::HalfYearLine(page) => (
            Arc::new(HttpStockApi::new(&config.api)?),
            Request::List(QueryMode::HalfYearLine),
            page_of(page),
        ),
        Command::YearLine(page) => (
            Arc::new(HttpStockApi::new(&config.api)?),
            Request::List(QueryMode::YearLine),
            page_of(page),
        ),
        Command::Replay { input, mode } => (
            Arc::new(FixtureApi::new(input)),
            Request::List(mode.into()),
            PageRequest::first(default_size),
        ),
    };

    let noise: Box<dyn NoiseSource> = match cli.seed.or(config.render.seed) {
        Some(seed) => Box::new(RandomNoise::seeded(seed)),
        None => Box::new(RandomNoise::new()),
    };
    let dashboard = Dashboard::new(api, HtmlPage::new(&config.render.echarts_url), noise, page);

    let timer = utils::Timer::start("Dashboard load");
    dashboard.switch_tab(Tab::Chart).await;
    let outcome = match request {
        Request::List(mode) => dashboard.load_mode(mode).await,
        Request::Search(filter) => dashboard.search(filter).await,
    };
    let took = timer.elapsed();
    drop(timer);

    for notice in dashboard.take_notices() {
        match notice.level {
            NoticeLevel::Info => info!("{}", notice.message),
            NoticeLevel::Warning => warn!("{}", notice.message),
            NoticeLevel::Error => error!("{}", notice.message),
        }
    }

    let state = dashboard.state();
    let summary = &state.summary;
    let mode = state.query.mode;
    let date = state.stocks.first().map(|s| decoder::format_date(&s.trade_date));

    println!("─────────────────────────────────");
    println!("  Stock Dashboard — {}", mode);
    println!("─────────────────────────────────");
    println!("  Total    : {}", utils::fmt_number(summary.total_count as i64));
    println!("  Limit up : {}", utils::fmt_number(summary.limit_up_count as i64));
    println!("  Limit dn : {}", utils::fmt_number(summary.limit_down_count as i64));
    println!("  Rising   : {} ({})", summary.positive_count, summary.positive_rate());
    println!("  Falling  : {} ({})", summary.negative_count, summary.negative_rate());
    println!("  Page     : {} ({} shown)", state.query.page.num, summary.page_len);
    println!("  Date     : {}", date.unwrap_or_else(|| "—".into()));
    println!("  Took     : {:.2?}", took);
    println!("─────────────────────────────────");

    if cli.csv {
        render::table::write_grid(std::io::stdout().lock(), &state.stocks)?;
    } else {
        for s in &state.stocks {
            println!(
                "  {:<12} {:>8} {:>8}%",
                s.ts_code,
                utils::fmt_opt(s.close),
                utils::fmt_opt(s.pct_chg)
            );
        }
    }

    if let LoadOutcome::Loaded { charts, .. } = outcome
        && charts > 0
    {
        let path = cli.out.unwrap_or(config.render.output_path);
        let stats = [
            ("Total", summary.total_count.to_string()),
            ("Rising", summary.positive_rate()),
            ("Falling", summary.negative_rate()),
        ];
        dashboard.with_board(|board| board.surface().write_to(&path, &mode.to_string(), &stats))?;
        println!("Dashboard with {} charts written to {}", charts, path.display());
    }

    Ok(())
}
