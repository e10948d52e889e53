//! `OrderBookRepository` (C1, §4.1) — the port the engine consults when a
//! run opts into book-aware execution, plus an in-memory implementation
//! that preloads all snapshots so a run performs no suspensions (§5).

use crate::domain::orderbook_snapshot::{BookSide, OrderBookSnapshot};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
pub struct SaveAudit {
    pub accepted: usize,
    pub duplicates_dropped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SpreadDepth {
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
    pub effective_spread: f64,
    pub levels: usize,
}

/// Read-only-per-run contract over historical order-book snapshots.
///
/// `Send + Sync` so independent runs launched by an external campaign layer
/// may share one repository across threads (§5); the core itself never
/// spawns threads.
pub trait OrderBookRepository: Send + Sync {
    fn save(&mut self, symbol: &str, snapshots: Vec<OrderBookSnapshot>) -> SaveAudit;

    fn load(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&OrderBookSnapshot>;

    /// Returns the snapshot closest to `ts` regardless of distance, paired
    /// with how far away it is. `None` means the symbol has no snapshots at
    /// all. Callers that care about tolerance (`snapshot_near`, and
    /// execution routing distinguishing "stale" from "missing") build on
    /// this rather than duplicating the nearest-neighbor scan.
    fn nearest(&self, symbol: &str, ts: DateTime<Utc>) -> Option<(&OrderBookSnapshot, Duration)>;

    /// Returns the snapshot whose timestamp is closest to `ts` within
    /// `tolerance`, or `None`. Absence is not an error — callers fall back
    /// to a bar approximation (§4.4).
    fn snapshot_near(&self, symbol: &str, ts: DateTime<Utc>, tolerance: Duration) -> Option<&OrderBookSnapshot> {
        self.nearest(symbol, ts).filter(|(_, distance)| *distance <= tolerance).map(|(snapshot, _)| snapshot)
    }

    fn spread_depth(&self, symbol: &str, ts: DateTime<Utc>, notional: f64, tolerance: Duration) -> Option<SpreadDepth> {
        let snapshot = self.snapshot_near(symbol, ts, tolerance)?;
        let (bid_price, bid_qty) = snapshot.depth_for_notional(notional, BookSide::Bid)?;
        let (ask_price, ask_qty) = snapshot.depth_for_notional(notional, BookSide::Ask)?;
        Some(SpreadDepth {
            bid_price,
            bid_qty,
            ask_price,
            ask_qty,
            effective_spread: ask_price - bid_price,
            levels: snapshot.side(BookSide::Bid).len().max(snapshot.side(BookSide::Ask).len()),
        })
    }
}

/// Snapshots are ordered and deduplicated by timestamp on write, keyed by
/// symbol, kept entirely in memory (the teacher's own `trendlab-core` has
/// no out-of-process book store; this mirrors that choice for the core).
#[derive(Debug, Default)]
pub struct InMemoryOrderBookRepository {
    by_symbol: BTreeMap<String, Vec<OrderBookSnapshot>>,
}

impl InMemoryOrderBookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderBookRepository for InMemoryOrderBookRepository {
    fn save(&mut self, symbol: &str, snapshots: Vec<OrderBookSnapshot>) -> SaveAudit {
        let entry = self.by_symbol.entry(symbol.to_string()).or_default();
        let mut accepted = 0;
        let mut duplicates_dropped = 0;
        for snapshot in snapshots {
            if entry.iter().any(|s| s.ts == snapshot.ts) {
                duplicates_dropped += 1;
                continue;
            }
            entry.push(snapshot);
            accepted += 1;
        }
        entry.sort_by_key(|s| s.ts);
        SaveAudit { accepted, duplicates_dropped }
    }

    fn load(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&OrderBookSnapshot> {
        self.by_symbol
            .get(symbol)
            .map(|snapshots| snapshots.iter().filter(|s| s.ts >= start && s.ts <= end).collect())
            .unwrap_or_default()
    }

    fn nearest(&self, symbol: &str, ts: DateTime<Utc>) -> Option<(&OrderBookSnapshot, Duration)> {
        let snapshots = self.by_symbol.get(symbol)?;
        snapshots.iter().min_by_key(|s| (s.ts - ts).abs()).map(|s| (s, (s.ts - ts).abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orderbook_snapshot::BookLevel;
    use chrono::TimeZone;

    fn snapshot_at(secs: i64) -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            Utc.timestamp_opt(secs, 0).unwrap(),
            "SPY",
            "SIM",
            vec![BookLevel { price: 99.9, qty: 10.0 }],
            vec![BookLevel { price: 100.0, qty: 10.0 }],
        )
        .unwrap()
    }

    #[test]
    fn save_deduplicates_by_timestamp() {
        let mut repo = InMemoryOrderBookRepository::new();
        let audit = repo.save("SPY", vec![snapshot_at(0), snapshot_at(0), snapshot_at(60)]);
        assert_eq!(audit.accepted, 2);
        assert_eq!(audit.duplicates_dropped, 1);
    }

    #[test]
    fn snapshot_near_respects_tolerance() {
        let mut repo = InMemoryOrderBookRepository::new();
        repo.save("SPY", vec![snapshot_at(0)]);
        let found = repo.snapshot_near("SPY", Utc.timestamp_opt(30, 0).unwrap(), Duration::seconds(60));
        assert!(found.is_some());
        let missing = repo.snapshot_near("SPY", Utc.timestamp_opt(300, 0).unwrap(), Duration::seconds(60));
        assert!(missing.is_none());
    }

    #[test]
    fn snapshot_near_absence_is_not_an_error() {
        let repo = InMemoryOrderBookRepository::new();
        assert!(repo.snapshot_near("QQQ", Utc.timestamp_opt(0, 0).unwrap(), Duration::seconds(1)).is_none());
    }

    #[test]
    fn nearest_returns_the_closest_snapshot_and_its_distance_regardless_of_tolerance() {
        let mut repo = InMemoryOrderBookRepository::new();
        repo.save("SPY", vec![snapshot_at(0), snapshot_at(600)]);
        let (snapshot, distance) = repo.nearest("SPY", Utc.timestamp_opt(550, 0).unwrap()).unwrap();
        assert_eq!(snapshot.ts, Utc.timestamp_opt(600, 0).unwrap());
        assert_eq!(distance, Duration::seconds(50));
    }

    #[test]
    fn nearest_is_none_only_when_the_symbol_has_no_snapshots_at_all() {
        let repo = InMemoryOrderBookRepository::new();
        assert!(repo.nearest("QQQ", Utc.timestamp_opt(0, 0).unwrap()).is_none());
    }
}
