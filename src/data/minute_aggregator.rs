/// Last-value-per-minute aggregation from live ticks
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::time::floor_to_minute;
use crate::types::{CanonicalTick, MinuteRecord, MinuteState};

/// Per-symbol aggregation state: nothing seen yet, or holding the current minute
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MinuteSlot {
    #[default]
    Empty,
    Holding(MinuteState),
}

/// Outcome of feeding one tick into a slot
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// First tick for the symbol opened a minute
    Started,
    /// Tick fell in the held minute and replaced its price
    Updated,
    /// Tick opened a later minute; the previous minute is final
    Flushed(MinuteRecord),
    /// Tick belongs to a minute before the held one and was ignored
    Stale,
}

impl MinuteSlot {
    /// Next slot for `tick`. Pure: callers store the returned slot.
    pub fn advance(self, tick: &CanonicalTick, retention_seconds: i64) -> (MinuteSlot, Transition) {
        let minute_start = floor_to_minute(&tick.timestamp);
        let opened = MinuteState {
            minute_start,
            last_price: tick.price,
        };

        match self {
            MinuteSlot::Empty => (MinuteSlot::Holding(opened), Transition::Started),
            MinuteSlot::Holding(held) if minute_start == held.minute_start => (
                MinuteSlot::Holding(MinuteState {
                    last_price: tick.price,
                    ..held
                }),
                Transition::Updated,
            ),
            MinuteSlot::Holding(held) if minute_start > held.minute_start => (
                MinuteSlot::Holding(opened),
                Transition::Flushed(minute_record(&tick.symbol, &held, retention_seconds)),
            ),
            // minute_start never moves backward
            held @ MinuteSlot::Holding(_) => (held, Transition::Stale),
        }
    }

    pub fn state(&self) -> Option<MinuteState> {
        match self {
            MinuteSlot::Empty => None,
            MinuteSlot::Holding(state) => Some(*state),
        }
    }
}

/// Record for a finalized minute; expiry is `retention_seconds` after the minute start
pub fn minute_record(symbol: &str, state: &MinuteState, retention_seconds: i64) -> MinuteRecord {
    let epoch_seconds = state.minute_start.timestamp();
    MinuteRecord {
        symbol: symbol.to_string(),
        epoch_seconds,
        price: state.last_price,
        expiry_epoch: epoch_seconds + retention_seconds,
    }
}

fn log_transition(tick: &CanonicalTick, transition: &Transition) {
    match transition {
        Transition::Started => {
            debug!("🆕 Started minute: {} @ {}", tick.symbol, floor_to_minute(&tick.timestamp));
        }
        Transition::Updated => {}
        Transition::Flushed(record) => {
            debug!(
                "📊 Minute completed: {} @ {} - price {:.4}",
                record.symbol, record.epoch_seconds, record.price
            );
        }
        Transition::Stale => {
            debug!(
                "⏪ Ignoring out-of-order tick: {} @ {} (price {:.4})",
                tick.symbol, tick.timestamp, tick.price
            );
        }
    }
}

/// Owned per-symbol table; a single writer drives it
pub struct MinuteAggregator {
    slots: HashMap<String, MinuteSlot>,
    retention_seconds: i64,
}

impl MinuteAggregator {
    pub fn new(retention_days: i64) -> Self {
        MinuteAggregator {
            slots: HashMap::new(),
            retention_seconds: retention_days * 86_400,
        }
    }

    /// Feed one tick, returning the finalized previous minute if the tick crossed a boundary
    pub fn ingest(&mut self, tick: &CanonicalTick) -> Option<MinuteRecord> {
        match self.apply(tick) {
            Transition::Flushed(record) => Some(record),
            _ => None,
        }
    }

    pub fn apply(&mut self, tick: &CanonicalTick) -> Transition {
        let slot = self.slots.entry(tick.symbol.clone()).or_default();
        let (next, transition) = slot.advance(tick, self.retention_seconds);
        *slot = next;
        log_transition(tick, &transition);
        transition
    }

    pub fn state(&self, symbol: &str) -> Option<MinuteState> {
        self.slots.get(symbol).and_then(MinuteSlot::state)
    }

    pub fn symbol_count(&self) -> usize {
        self.slots.len()
    }

    /// Emit every held minute and reset the slots (e.g. at shutdown)
    pub fn finalize_all(&mut self) -> Vec<MinuteRecord> {
        let mut records: Vec<MinuteRecord> = self
            .slots
            .iter_mut()
            .filter_map(|(symbol, slot)| {
                let state = std::mem::take(slot).state()?;
                Some(minute_record(symbol, &state, self.retention_seconds))
            })
            .collect();
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        records
    }
}

/// Thread-safe aggregator with one exclusion lock per symbol
pub struct SharedMinuteAggregator {
    cells: RwLock<HashMap<String, Arc<Mutex<MinuteSlot>>>>,
    retention_seconds: i64,
}

impl SharedMinuteAggregator {
    pub fn new(retention_days: i64) -> Self {
        SharedMinuteAggregator {
            cells: RwLock::new(HashMap::new()),
            retention_seconds: retention_days * 86_400,
        }
    }

    async fn cell(&self, symbol: &str) -> Arc<Mutex<MinuteSlot>> {
        {
            let cells = self.cells.read().await;
            if let Some(cell) = cells.get(symbol) {
                return Arc::clone(cell);
            }
        }

        let mut cells = self.cells.write().await;
        Arc::clone(cells.entry(symbol.to_string()).or_default())
    }

    pub async fn ingest(&self, tick: &CanonicalTick) -> Option<MinuteRecord> {
        let cell = self.cell(&tick.symbol).await;
        let mut slot = cell.lock().await;

        let (next, transition) = slot.advance(tick, self.retention_seconds);
        *slot = next;
        log_transition(tick, &transition);

        match transition {
            Transition::Flushed(record) => Some(record),
            _ => None,
        }
    }

    pub async fn state(&self, symbol: &str) -> Option<MinuteState> {
        let cell = {
            let cells = self.cells.read().await;
            cells.get(symbol).cloned()
        }?;
        let slot = cell.lock().await;
        slot.state()
    }

    pub async fn finalize_all(&self) -> Vec<MinuteRecord> {
        let cells: Vec<(String, Arc<Mutex<MinuteSlot>>)> = {
            let cells = self.cells.read().await;
            cells.iter().map(|(s, c)| (s.clone(), Arc::clone(c))).collect()
        };

        let mut records = Vec::new();
        for (symbol, cell) in cells {
            let mut slot = cell.lock().await;
            if let Some(state) = std::mem::take(&mut *slot).state() {
                records.push(minute_record(&symbol, &state, self.retention_seconds));
            }
        }
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::DISPLAY_TZ;
    use chrono::{DateTime, Duration, TimeZone};
    use chrono_tz::Tz;

    fn minute(h: u32, m: u32) -> DateTime<Tz> {
        DISPLAY_TZ.with_ymd_and_hms(2025, 1, 15, h, m, 0).unwrap()
    }

    fn tick(symbol: &str, at: DateTime<Tz>, price: f64) -> CanonicalTick {
        CanonicalTick::bare(symbol, at, price)
    }

    #[test]
    fn test_single_tick_emits_nothing() {
        let mut agg = MinuteAggregator::new(60);
        assert_eq!(agg.ingest(&tick("X", minute(10, 0), 100.0)), None);
        assert_eq!(agg.state("X").unwrap().last_price, 100.0);
    }

    #[test]
    fn test_flush_on_minute_boundary() {
        let mut agg = MinuteAggregator::new(60);
        let m0 = minute(10, 0);

        assert_eq!(agg.ingest(&tick("X", m0 + Duration::seconds(10), 100.0)), None);
        assert_eq!(agg.ingest(&tick("X", m0 + Duration::seconds(40), 101.0)), None);

        let record = agg
            .ingest(&tick("X", m0 + Duration::seconds(65), 102.0))
            .expect("crossing the boundary flushes the previous minute");
        assert_eq!(record.symbol, "X");
        assert_eq!(record.epoch_seconds, m0.timestamp());
        assert_eq!(record.price, 101.0);
        assert_eq!(record.expiry_epoch, m0.timestamp() + 60 * 86_400);

        assert_eq!(agg.ingest(&tick("X", m0 + Duration::seconds(110), 103.0)), None);
        let state = agg.state("X").unwrap();
        assert_eq!(state.minute_start, minute(10, 1));
        assert_eq!(state.last_price, 103.0);
    }

    #[test]
    fn test_one_record_per_transition() {
        let mut agg = MinuteAggregator::new(60);
        let start = minute(9, 30);
        let mut emitted = Vec::new();

        // three ticks per minute over five minutes
        for m in 0..5 {
            for s in [5, 25, 45] {
                let at = start + Duration::minutes(m) + Duration::seconds(s);
                let price = (m * 100 + s) as f64;
                emitted.extend(agg.ingest(&tick("X", at, price)));
            }
        }

        assert_eq!(emitted.len(), 4);
        for (m, record) in emitted.iter().enumerate() {
            assert_eq!(record.epoch_seconds, (start + Duration::minutes(m as i64)).timestamp());
            assert_eq!(record.price, (m as i64 * 100 + 45) as f64);
        }
    }

    #[test]
    fn test_gap_minutes_produce_no_records() {
        let mut agg = MinuteAggregator::new(60);
        agg.ingest(&tick("X", minute(10, 0), 1.0));

        let record = agg.ingest(&tick("X", minute(10, 7), 2.0)).unwrap();
        assert_eq!(record.epoch_seconds, minute(10, 0).timestamp());
        assert_eq!(agg.state("X").unwrap().minute_start, minute(10, 7));
    }

    #[test]
    fn test_out_of_order_tick_is_ignored() {
        let mut agg = MinuteAggregator::new(60);
        agg.ingest(&tick("X", minute(10, 5), 50.0));

        let transition = agg.apply(&tick("X", minute(10, 4), 49.0));
        assert_eq!(transition, Transition::Stale);

        let state = agg.state("X").unwrap();
        assert_eq!(state.minute_start, minute(10, 5));
        assert_eq!(state.last_price, 50.0);

        // the next in-order crossing still flushes the held minute exactly once
        let record = agg.ingest(&tick("X", minute(10, 6), 51.0)).unwrap();
        assert_eq!(record.price, 50.0);
    }

    #[test]
    fn test_symbols_are_isolated() {
        let mut agg = MinuteAggregator::new(60);
        agg.ingest(&tick("A", minute(10, 0), 1.0));
        agg.ingest(&tick("B", minute(10, 0), 2.0));

        let record = agg.ingest(&tick("A", minute(10, 1), 3.0)).unwrap();
        assert_eq!(record.symbol, "A");
        assert_eq!(agg.state("B").unwrap().last_price, 2.0);
        assert_eq!(agg.symbol_count(), 2);
    }

    #[test]
    fn test_finalize_all_drains_held_minutes() {
        let mut agg = MinuteAggregator::new(1);
        agg.ingest(&tick("B", minute(10, 0), 2.0));
        agg.ingest(&tick("A", minute(10, 0), 1.0));

        let records = agg.finalize_all();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "A");
        assert_eq!(records[1].expiry_epoch, minute(10, 0).timestamp() + 86_400);

        assert!(agg.state("A").is_none());
        assert!(agg.finalize_all().is_empty());
    }

    #[tokio::test]
    async fn test_shared_aggregator_matches_owned() {
        let shared = SharedMinuteAggregator::new(60);
        let m0 = minute(15, 59);

        assert!(shared.ingest(&tick("X", m0 + Duration::seconds(10), 100.0)).await.is_none());
        assert!(shared.ingest(&tick("X", m0 + Duration::seconds(40), 101.0)).await.is_none());
        let record = shared
            .ingest(&tick("X", m0 + Duration::seconds(65), 102.0))
            .await
            .unwrap();
        assert_eq!(record.price, 101.0);

        assert!(shared.ingest(&tick("X", m0 + Duration::seconds(110), 103.0)).await.is_none());
        assert_eq!(shared.state("X").await.unwrap().last_price, 103.0);
        assert!(shared.state("Y").await.is_none());

        let held = shared.finalize_all().await;
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].price, 103.0);
    }

    #[tokio::test]
    async fn test_shared_aggregator_concurrent_symbols() {
        let shared = Arc::new(SharedMinuteAggregator::new(60));
        let mut handles = Vec::new();

        for symbol in ["A", "B", "C", "D"] {
            let shared = Arc::clone(&shared);
            handles.push(tokio::spawn(async move {
                let mut emitted = 0;
                for m in 0..10 {
                    let at = minute(11, 0) + Duration::minutes(m);
                    if shared.ingest(&tick(symbol, at, m as f64)).await.is_some() {
                        emitted += 1;
                    }
                }
                emitted
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 9);
        }
    }
}
