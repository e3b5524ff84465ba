//! kline_trader - Main Entry Point
//!
//! Streams Binance klines, derives SMA-crossover signals, and routes
//! risk-sized orders to the configured execution sink.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use kline_trader::binance::{BinanceBroker, BinanceRestClient};
use kline_trader::compliance::PermissiveGate;
use kline_trader::config::{load_config, AppConfig, SinkMode};
use kline_trader::execution::{BacktestSink, BoxedSink, LiveSink, PaperSink};
use kline_trader::feed::live::ReconnectPolicy;
use kline_trader::feed::{BoxedFeed, HistoricalFeed, LiveFeed};
use kline_trader::trader::Trader;

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Execution mode override (backtest, paper, live)
    #[arg(long)]
    mode: Option<String>,

    /// Comma-separated list of symbols to subscribe
    #[arg(long)]
    symbols: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    info!("Starting kline_trader");
    info!("Configuration file: {}", args.config);

    let mut config = load_config(Some(&args.config))?;
    if let Some(mode) = &args.mode {
        config.engine.mode = match mode.to_lowercase().as_str() {
            "backtest" => SinkMode::Backtest,
            "paper" => SinkMode::Paper,
            "live" => SinkMode::Live,
            other => return Err(anyhow!("unknown mode: {}", other)),
        };
    }
    if let Some(symbols) = &args.symbols {
        config.engine.symbols = symbols.split(',').map(|s| s.trim().to_string()).collect();
    }

    info!(
        "Mode {}, symbols {:?}",
        config.engine.mode, config.engine.symbols
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping workers after the current tick");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = match config.engine.mode {
        SinkMode::Backtest => run_backtest(&config, shutdown_rx).await?,
        SinkMode::Paper => run_paper(&config, shutdown_rx).await?,
        SinkMode::Live => run_live(&config, shutdown_rx).await?,
    };

    info!(
        "Final equity {} (realized PnL {}); {} fills, {} rejections, {} compliance rejections",
        report.final_equity,
        report.realized_pnl,
        report.fills.len(),
        report.rejections.len(),
        report.compliance_rejections
    );
    for (symbol, error) in &report.worker_failures {
        warn!("Worker {} failed: {}", symbol, error);
    }

    Ok(())
}

fn backtest_range(config: &AppConfig) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let parse = |label: &str, value: &Option<String>| -> Result<DateTime<Utc>> {
        let raw = value
            .as_deref()
            .ok_or_else(|| anyhow!("backtest.{} is required in backtest mode", label))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("backtest.{} is not a valid RFC 3339 timestamp", label))
    };
    Ok((
        parse("start", &config.backtest.start)?,
        parse("end", &config.backtest.end)?,
    ))
}

async fn run_backtest(
    config: &AppConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<kline_trader::RunReport> {
    let (start, end) = backtest_range(config)?;
    let rest = BinanceRestClient::new(&config.binance.rest_url)?;

    let mut trader = Trader::new(
        config,
        Box::new(BacktestSink::new()) as BoxedSink,
        Arc::new(PermissiveGate),
    );
    for symbol in &config.engine.symbols {
        let bars = rest.get_klines(symbol, start, end).await?;
        info!("Loaded {} bars for {}", bars.len(), symbol);
        trader.add_feed(Box::new(HistoricalFeed::from_bars(symbol.to_uppercase(), bars)) as BoxedFeed);
    }

    Ok(trader.run(shutdown).await?)
}

async fn run_paper(
    config: &AppConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<kline_trader::RunReport> {
    let sink = PaperSink::new()
        .with_latency(Duration::from_millis(config.settings.paper_latency_ms));
    let mut trader = Trader::new(config, Box::new(sink) as BoxedSink, Arc::new(PermissiveGate));
    add_live_feeds(config, &mut trader).await?;
    Ok(trader.run(shutdown).await?)
}

async fn run_live(
    config: &AppConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<kline_trader::RunReport> {
    let credentials = config
        .binance
        .credentials()
        .ok_or_else(|| anyhow!("live mode requires binance.api_key and binance.api_secret"))?;
    let broker = BinanceBroker::new(&config.binance.rest_url, credentials)?;
    let mut sink = LiveSink::new(
        Box::new(broker),
        Duration::from_secs(config.settings.submit_timeout_secs),
    );
    sink.connect().await?;

    let mut trader = Trader::new(config, Box::new(sink) as BoxedSink, Arc::new(PermissiveGate));
    add_live_feeds(config, &mut trader).await?;
    Ok(trader.run(shutdown).await?)
}

async fn add_live_feeds(config: &AppConfig, trader: &mut Trader) -> Result<()> {
    let policy = ReconnectPolicy::from_settings(&config.settings);
    for symbol in &config.engine.symbols {
        let feed = LiveFeed::connect(
            symbol.to_uppercase(),
            &config.binance.websocket_url,
            policy.clone(),
        )
        .await?;
        trader.add_feed(Box::new(feed) as BoxedFeed);
    }
    Ok(())
}
