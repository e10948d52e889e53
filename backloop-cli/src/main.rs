//! Backloop CLI — a thin runner around `backloop-core`.
//!
//! Reads a CSV candle file, runs one backtest with the identity strategy
//! (hold-only, useful as a tracking-error/data-sanity baseline) and prints
//! the resulting `BacktestResult` as JSON. Strategy composition and
//! file-based config loading live outside this crate's scope (§6).

use anyhow::{Context, Result};
use backloop_core::clock::SystemClock;
use backloop_core::domain::candle::{Candle, CandleSeries};
use backloop_core::engine::{
    BacktestRunRequest, Engine, EngineConfig, IdentityStrategy, SlippageModel, Timeframe,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "backloop", about = "Event-driven backtest runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a backtest against a CSV candle file.
    Run {
        /// Path to a CSV file with columns: ts,open,high,low,close,volume
        #[arg(long)]
        csv: PathBuf,
        /// Instrument symbol stamped onto the result.
        #[arg(long)]
        symbol: String,
        #[arg(long, value_enum, default_value = "d1")]
        timeframe: TimeframeArg,
        #[arg(long, default_value_t = 100_000.0)]
        capital: f64,
        #[arg(long, default_value_t = 0.0)]
        commission_bps: f64,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum TimeframeArg {
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

impl From<TimeframeArg> for Timeframe {
    fn from(t: TimeframeArg) -> Self {
        match t {
            TimeframeArg::M15 => Timeframe::M15,
            TimeframeArg::M30 => Timeframe::M30,
            TimeframeArg::H1 => Timeframe::H1,
            TimeframeArg::H4 => Timeframe::H4,
            TimeframeArg::D1 => Timeframe::D1,
            TimeframeArg::W1 => Timeframe::W1,
        }
    }
}

fn load_candles(path: &PathBuf) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut candles = Vec::new();
    for record in reader.records() {
        let record = record?;
        let ts: DateTime<Utc> = record.get(0).context("missing ts column")?.parse()?;
        let open: f64 = record.get(1).context("missing open column")?.parse()?;
        let high: f64 = record.get(2).context("missing high column")?.parse()?;
        let low: f64 = record.get(3).context("missing low column")?.parse()?;
        let close: f64 = record.get(4).context("missing close column")?.parse()?;
        let volume: f64 = record.get(5).context("missing volume column")?.parse()?;
        candles.push(Candle::new(ts, open, high, low, close, volume));
    }
    Ok(candles)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { csv, symbol, timeframe, capital, commission_bps, seed } => {
            let candles = load_candles(&csv)?;
            let series = CandleSeries::new(symbol.clone(), candles)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .context("candle series failed construction invariants")?;

            let start = series.get(0).unwrap().ts;
            let end = series.get(series.len() - 1).unwrap().ts;

            let request = BacktestRunRequest {
                instrument: symbol,
                timeframe: timeframe.into(),
                start,
                end,
                initial_capital: capital,
                commission_rate: commission_bps / 10_000.0,
                slippage_model: SlippageModel::None,
                fixed_slippage_bps: None,
                use_orderbook: false,
                seed,
                strategy: Box::new(IdentityStrategy),
            };

            let engine = Engine::new(EngineConfig::default());
            let result = engine.run(request, &series, &SystemClock, None)?;

            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}
