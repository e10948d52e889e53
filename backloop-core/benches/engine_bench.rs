//! Criterion benchmarks for the backtest engine's hot paths.
//!
//! Benchmarks:
//! 1. The per-bar event loop (full backtest run, identity vs. trading strategy)
//! 2. Order fill simulation (`Order::try_fill` against a bar, no book)
//! 3. Fill-model slippage estimation against an order book snapshot

use backloop_core::clock::FixedClock;
use backloop_core::domain::candle::{Candle, CandleSeries};
use backloop_core::domain::ids::OrderId;
use backloop_core::domain::order::{Order, OrderSide, OrderType};
use backloop_core::domain::orderbook_snapshot::{BookLevel, OrderBookSnapshot};
use backloop_core::engine::{
    BacktestRunRequest, Engine, EngineConfig, IdentityStrategy, Signal, SlippageModel, Strategy,
    StrategyContext, Timeframe,
};
use backloop_core::orderbook::{DepthMethod, FillModel, FillModelConfig, ImpactFunction};
use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn synthetic_series(n: usize) -> CandleSeries {
    let base = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.05).sin() * 8.0;
            let open = close - 0.2;
            let high = close.max(open) + 1.0;
            let low = close.min(open) - 1.0;
            Candle::new(base + chrono::Duration::days(i as i64), open, high, low, close, 1_000_000.0)
        })
        .collect();
    CandleSeries::new("BENCH", candles).unwrap()
}

/// Crosses long on every 20th bar, flat otherwise — enough order flow to
/// exercise entry, protective-exit and periodic-return bookkeeping without
/// the run ever degenerating into a single long-held position.
#[derive(Default)]
struct Oscillator {
    bar_index: u64,
}

impl Strategy for Oscillator {
    fn on_bar(&mut self, ctx: &StrategyContext) -> Signal {
        self.bar_index += 1;
        if ctx.position.is_none() && self.bar_index % 20 == 0 {
            Signal::Enter { side: OrderSide::Buy, entry_price: ctx.bar.close }
        } else if ctx.position.is_some() && self.bar_index % 20 == 10 {
            Signal::Exit
        } else {
            Signal::Hold
        }
    }

    fn name(&self) -> &str {
        "oscillator"
    }
}

fn run_request(strategy: Box<dyn Strategy>, series: &CandleSeries) -> BacktestRunRequest {
    BacktestRunRequest {
        instrument: series.symbol.clone(),
        timeframe: Timeframe::D1,
        start: series.get(0).unwrap().ts,
        end: series.get(series.len() - 1).unwrap().ts,
        initial_capital: 100_000.0,
        commission_rate: 0.0005,
        slippage_model: SlippageModel::Fixed,
        fixed_slippage_bps: Some(2.0),
        use_orderbook: false,
        seed: Some(7),
        strategy,
    }
}

fn bench_engine_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_run");
    let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

    for &bar_count in &[252usize, 1260, 2520] {
        let series = synthetic_series(bar_count);

        group.bench_with_input(BenchmarkId::new("identity", bar_count), &bar_count, |b, _| {
            b.iter(|| {
                let engine = Engine::new(EngineConfig::default());
                let request = run_request(Box::new(IdentityStrategy), black_box(&series));
                engine.run(request, black_box(&series), &clock, None).unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("oscillator", bar_count), &bar_count, |b, _| {
            b.iter(|| {
                let engine = Engine::new(EngineConfig::default());
                let request = run_request(Box::new(Oscillator::default()), black_box(&series));
                engine.run(request, black_box(&series), &clock, None).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_order_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_fill");
    let bar = Candle::new(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(), 100.0, 103.0, 98.0, 101.0, 1_000_000.0);
    let fill_model = FillModel::new(FillModelConfig::default());

    group.bench_function("market_no_book", |b| {
        b.iter(|| {
            let mut order = Order::new(
                OrderId(0),
                "BENCH",
                OrderSide::Buy,
                OrderType::Market,
                100.0,
                bar.ts,
                20,
            );
            black_box(order.try_fill(black_box(&bar), None, &fill_model))
        });
    });

    group.finish();
}

fn bench_slippage_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("slippage_estimate");
    let bar = Candle::new(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(), 100.0, 103.0, 98.0, 101.0, 1_000_000.0);
    let book = OrderBookSnapshot::new(
        bar.ts,
        "BENCH",
        "SIM",
        vec![BookLevel { price: 100.9, qty: 500.0 }, BookLevel { price: 100.8, qty: 800.0 }],
        vec![BookLevel { price: 101.1, qty: 500.0 }, BookLevel { price: 101.2, qty: 800.0 }],
    )
    .unwrap();

    for impact_fn in [ImpactFunction::Linear, ImpactFunction::Exponential] {
        let config = FillModelConfig { impact_fn, depth_method: DepthMethod::DistanceWeighted, ..FillModelConfig::default() };
        let model = FillModel::new(config);
        group.bench_with_input(BenchmarkId::new("estimate", format!("{impact_fn:?}")), &impact_fn, |b, _| {
            b.iter(|| black_box(model.estimate_slippage(black_box(&bar), Some(black_box(&book)), 200.0, OrderSide::Buy)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_engine_run, bench_order_fill, bench_slippage_estimate);
criterion_main!(benches);
