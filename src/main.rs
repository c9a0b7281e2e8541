use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use digitbot::api::InboundMessage;
use digitbot::config::Settings;
use digitbot::connection::ConnectionManager;
use digitbot::execution::{DigitStore, LifecycleSettings, RunReport, StrategyRunner};
use digitbot::indicators::{
    current_drought, digit_streaks, find_droughts, group_share, momentum_delta, rank_digits,
    rank_win_rates, top_digits, RANK_WINDOWS,
};
use digitbot::models::Digit;
use digitbot::persistence::DigitCache;
use digitbot::strategy::rank_match::MATCH_LEGS;
use digitbot::strategy::StrategyKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, timeout, Duration};
use tracing_subscriber::EnvFilter;

/// Digit contract trading bot
#[derive(Parser, Debug)]
#[command(name = "digitbot")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trade a strategy until its limits are hit or Ctrl+C
    Run {
        #[arg(short, long, value_enum)]
        strategy: StrategyKind,

        /// Instrument for single-market strategies (overrides config)
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Backfill one instrument and log its digit statistics
    Analyze {
        #[arg(long)]
        symbol: String,

        /// Seconds to wait for the backfill
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Invalid configuration")?;

    match cli.command {
        Command::Run { strategy, symbol } => run(settings, strategy, symbol).await,
        Command::Analyze { symbol, wait } => analyze(settings, &symbol, Duration::from_secs(wait)).await,
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("digitbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ============================================================================
// Trading
// ============================================================================

async fn run(settings: Settings, kind: StrategyKind, symbol: Option<String>) -> Result<()> {
    tracing::info!("🚀 digitbot starting: {}", kind);

    let store = DigitStore::default();
    let cache = connect_cache(&settings).await;

    let selected = match symbol {
        Some(symbol) => symbol,
        None => load_selected(cache.as_ref()).await.unwrap_or_else(|| settings.markets.selected.clone()),
    };

    let strategy = kind.build(&selected, &settings.markets.symbols, &settings.analysis);
    let symbols = strategy.symbols();

    if let Some(cache) = &cache {
        let mut cache = cache.lock().await;
        if let Err(e) = cache.save_selected(&selected).await {
            tracing::warn!("Failed to cache selected symbol: {}", e);
        }
        match cache.rehydrate(&store, &symbols).await {
            Ok(restored) => tracing::info!(symbols = restored, "Digit cache rehydrated"),
            Err(e) => tracing::warn!("Failed to rehydrate digit cache: {}", e),
        }
    }

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Strategy: {}", kind);
    tracing::info!("  Stake: {} {}", settings.trading.stake, settings.trading.currency);
    tracing::info!("  Target profit: {}", settings.trading.target_profit);
    tracing::info!("  Stop loss: {}", settings.trading.stop_loss);
    if symbols.is_empty() {
        tracing::info!("  Markets: all continuous indices");
    } else {
        tracing::info!("  Markets: {}", symbols.join(", "));
    }

    let connection = ConnectionManager::new(settings.connection.to_settings(), store.clone());
    connection.track(symbols);
    let listener = connection.subscribe();

    if let Err(e) = connection.connect().await {
        tracing::warn!("Initial connection failed, retrying in background: {}", e);
    }

    let runner = StrategyRunner::new(
        strategy,
        LifecycleSettings::new(settings.trading.terms()),
        settings.trading.limits(),
        connection.clone(),
        listener,
        store.clone(),
        settings.trading.rate_limit,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut runner_task = tokio::spawn(runner.run(shutdown_rx));

    let flush_task = cache.clone().map(|cache| {
        let store = store.clone();
        let every = Duration::from_secs(settings.persistence.flush_interval_secs.max(1));
        tokio::spawn(async move { cache_flush_loop(cache, store, every).await })
    });

    tracing::info!("\nPress Ctrl+C to stop...\n");

    let report = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, draining open contracts...");
            let _ = shutdown_tx.send(true);
            (&mut runner_task).await
        }
        result = &mut runner_task => result,
    };

    if let Some(task) = flush_task {
        task.abort();
    }
    if let Some(cache) = &cache {
        if let Err(e) = cache.lock().await.flush(&store).await {
            tracing::warn!("Final cache flush failed: {}", e);
        }
    }
    connection.close();

    let report = report.context("Runner task failed")?;
    print_report(&report);

    tracing::info!("👋 digitbot stopped");
    Ok(())
}

async fn connect_cache(settings: &Settings) -> Option<Arc<Mutex<DigitCache>>> {
    let url = settings.persistence.redis_url.as_deref()?;
    match DigitCache::new(url).await {
        Ok(cache) => Some(Arc::new(Mutex::new(cache))),
        Err(e) => {
            tracing::warn!("Redis unavailable, running without digit cache: {}", e);
            None
        }
    }
}

async fn load_selected(cache: Option<&Arc<Mutex<DigitCache>>>) -> Option<String> {
    let cache = cache?;
    match cache.lock().await.load_selected().await {
        Ok(selected) => selected,
        Err(e) => {
            tracing::warn!("Failed to read cached symbol: {}", e);
            None
        }
    }
}

async fn cache_flush_loop(cache: Arc<Mutex<DigitCache>>, store: DigitStore, every: Duration) {
    let mut ticker = interval(every);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = cache.lock().await.flush(&store).await {
            tracing::warn!("Digit cache flush failed: {}", e);
        }
    }
}

fn print_report(report: &RunReport) {
    tracing::info!("\n📈 Session summary:");
    tracing::info!("  Strategy: {}", report.strategy);
    tracing::info!("  Final state: {:?}", report.state);
    tracing::info!("  Batches: {}", report.batches);
    tracing::info!("  Winning / losing: {} / {}", report.winning_batches, report.losing_batches);
    tracing::info!("  P&L: {}", report.pnl);
}

// ============================================================================
// Analysis
// ============================================================================

async fn analyze(settings: Settings, symbol: &str, wait: Duration) -> Result<()> {
    let store = DigitStore::default();
    let connection = ConnectionManager::new(settings.connection.to_settings(), store.clone());
    connection.track(vec![symbol.to_string()]);
    let mut listener = connection.subscribe();

    if let Err(e) = connection.connect().await {
        tracing::warn!("Initial connection failed, retrying in background: {}", e);
    }

    tracing::info!(symbol, "⏳ Waiting for tick history");
    let backfilled = timeout(wait, async {
        while let Some(message) = listener.recv().await {
            if let InboundMessage::History(batch) = message.as_ref() {
                if batch.symbol == symbol {
                    return true;
                }
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    listener.unregister();
    connection.close();

    if !backfilled {
        anyhow::bail!("No history received for {} within {:?}", symbol, wait);
    }

    let digits = store.snapshot(symbol);
    report_analysis(&settings, symbol, &digits);
    Ok(())
}

fn report_analysis(settings: &Settings, symbol: &str, digits: &[Digit]) {
    let analysis = &settings.analysis;
    tracing::info!("\n🔍 {} ({} digits)", symbol, digits.len());

    if let Some(ranking) = rank_digits(digits, analysis.rank_window) {
        tracing::info!("\n🏆 Frequency ranking (last {}):", analysis.rank_window.min(digits.len()));
        for entry in &ranking {
            tracing::info!("  #{:<2} digit {}  x{}", entry.rank, entry.digit, entry.count);
        }
    }
    if let Some(top) = top_digits(digits, analysis.rank_window, MATCH_LEGS) {
        tracing::info!("  Rank-match legs now: {:?}", top);
    }

    let low = group_share(digits, &[0, 1], analysis.scan_window).unwrap_or_default();
    let high = group_share(digits, &[2, 3, 4, 5, 6, 7, 8, 9], analysis.scan_window).unwrap_or_default();
    tracing::info!("\n📊 Share 0-1: {:.2}%  2-9: {:.2}%", low, high);

    tracing::info!("\n🎯 Rank hit rates (next tick matches rank):");
    for window in RANK_WINDOWS {
        if let Some(backtest) = rank_win_rates(digits, window, 8) {
            let rates: Vec<String> = backtest
                .ranks
                .iter()
                .map(|r| r.win_rate().map_or("-".to_string(), |w| format!("{:.1}%", w)))
                .collect();
            tracing::info!("  last {:>4}: {}", window, rates.join(" "));
        }
    }

    match momentum_delta(digits, analysis.momentum_lookback, analysis.momentum_split) {
        Some(report) => {
            tracing::info!(
                "\n🌡️  Momentum (recent {} vs prior {}):",
                report.recent_size,
                report.prior_size
            );
            for m in &report.digits {
                tracing::info!(
                    "  digit {}  {:+.2}%  {:?} ({})",
                    m.digit,
                    m.delta,
                    m.trend(),
                    m.strength_label()
                );
            }
        }
        None => tracing::info!("\n🌡️  Momentum: not enough data"),
    }

    if let Some(report) = digit_streaks(digits, analysis.streak_lookback) {
        tracing::info!("\n🔥 Streaks (last {}):", report.window);
        for s in &report.digits {
            tracing::info!(
                "  digit {}  seen {}  streak {}  last {} ago  {:?}",
                s.digit,
                s.appearances,
                s.current_streak,
                s.last_seen_ago,
                s.status
            );
        }
    }

    let low_digits = [0, 1];
    let droughts = find_droughts(digits, &low_digits, digits.len(), analysis.drought_threshold);
    let longest = droughts.iter().map(|d| d.len).max().unwrap_or(0);
    tracing::info!(
        "\n🏜️  Droughts of 0/1 (>= {} ticks): {} found, longest {}",
        analysis.drought_threshold,
        droughts.len(),
        longest
    );
    if let Some(ongoing) = current_drought(digits, &low_digits, digits.len(), analysis.drought_threshold) {
        tracing::info!("  ongoing for {} ticks", ongoing.len);
    }
}
