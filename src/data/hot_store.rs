/// Hot store for finalized minutes - ordered in-memory index + JSONL (disk)
/// Paginated reads are stitched into one ordered list by `query_range`.
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{MinuteRecord, RawPoint};

/// One page of a range query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<RawPoint>,
    /// Resume key for the next page; None when the range is exhausted
    pub last_evaluated: Option<i64>,
}

#[async_trait]
pub trait HotStore: Send + Sync {
    /// Write (or overwrite) the record keyed by `(symbol, epoch_seconds)`
    async fn put(&self, record: &MinuteRecord) -> Result<()>;

    /// Records with `start_epoch <= ts <= end_epoch`, ascending, after `exclusive_start`
    async fn query_page(
        &self,
        symbol: &str,
        start_epoch: i64,
        end_epoch: i64,
        exclusive_start: Option<i64>,
        limit: usize,
    ) -> Result<Page>;

    fn page_size(&self) -> usize {
        1_000
    }

    /// Release records past their TTL; returns how many were dropped.
    /// Stores with native expiry leave this as a no-op.
    async fn expire(&self) -> Result<usize> {
        Ok(0)
    }

    /// Every page of the range as one ordered list
    async fn query_range(&self, symbol: &str, start_epoch: i64, end_epoch: i64) -> Result<Vec<RawPoint>> {
        let mut items = Vec::new();
        let mut cursor = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .query_page(symbol, start_epoch, end_epoch, cursor, self.page_size())
                .await?;
            pages += 1;
            items.extend(page.items);

            match page.last_evaluated {
                Some(key) => cursor = Some(key),
                None => break,
            }
        }

        debug!(
            "query_range: symbol={}, start={}, end={} -> {} items in {} pages",
            symbol,
            start_epoch,
            end_epoch,
            items.len(),
            pages
        );

        Ok(items)
    }
}

fn system_clock() -> i64 {
    Utc::now().timestamp()
}

/// Hot store keeping every live record in memory, optionally mirrored to a JSONL file
pub struct FileHotStore {
    index: RwLock<HashMap<String, BTreeMap<i64, MinuteRecord>>>,
    disk_file: Option<PathBuf>,
    page_size: usize,
    clock: fn() -> i64,
}

impl FileHotStore {
    pub fn new(disk_file: PathBuf, page_size: usize) -> Self {
        FileHotStore {
            index: RwLock::new(HashMap::new()),
            disk_file: Some(disk_file),
            page_size: page_size.max(1),
            clock: system_clock,
        }
    }

    /// Memory-only store (nothing survives the process)
    pub fn in_memory(page_size: usize) -> Self {
        FileHotStore {
            index: RwLock::new(HashMap::new()),
            disk_file: None,
            page_size: page_size.max(1),
            clock: system_clock,
        }
    }

    /// Replace the clock used for TTL checks
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Number of records held in memory (expired ones included until purged)
    pub async fn record_count(&self) -> usize {
        let index = self.index.read().await;
        index.values().map(BTreeMap::len).sum()
    }

    /// Rebuild the index from the JSONL file, skipping expired and unreadable lines
    pub async fn load_from_disk(&self) -> Result<usize> {
        let Some(disk_file) = &self.disk_file else {
            return Ok(0);
        };
        if !disk_file.exists() {
            debug!("No existing hot store file at {}", disk_file.display());
            return Ok(0);
        }

        let now = (self.clock)();
        let file = tokio::fs::File::open(disk_file).await?;
        let mut lines = BufReader::new(file).lines();

        let mut loaded = 0usize;
        let mut skipped = 0usize;
        let mut index = self.index.write().await;

        while let Some(line) = lines.next_line().await? {
            match serde_json::from_str::<MinuteRecord>(&line) {
                Ok(record) if !record.is_expired(now) => {
                    index
                        .entry(record.symbol.clone())
                        .or_default()
                        .insert(record.epoch_seconds, record);
                    loaded += 1;
                }
                Ok(_) => skipped += 1,
                Err(e) => {
                    warn!("Skipping unreadable hot store line: {}", e);
                    skipped += 1;
                }
            }
        }

        info!(
            "💾 Loaded hot store from {}: {} records, {} skipped",
            disk_file.display(),
            loaded,
            skipped
        );

        Ok(loaded)
    }

    /// Drop expired records from memory
    pub async fn purge_expired(&self) -> usize {
        let now = (self.clock)();
        let mut index = self.index.write().await;

        let mut removed = 0usize;
        for records in index.values_mut() {
            let before = records.len();
            records.retain(|_, record| !record.is_expired(now));
            removed += before - records.len();
        }
        index.retain(|_, records| !records.is_empty());

        if removed > 0 {
            debug!("Purged {} expired hot store records", removed);
        }
        removed
    }

    /// Purge expired records, then rewrite the JSONL file with live records only
    pub async fn compact(&self) -> Result<usize> {
        let removed = self.purge_expired().await;

        let Some(disk_file) = &self.disk_file else {
            return Ok(removed);
        };
        if !disk_file.exists() {
            return Ok(removed);
        }

        // Held across the rewrite so no put lands between snapshot and rename
        let index = self.index.write().await;

        let mut contents = String::new();
        let mut symbols: Vec<&String> = index.keys().collect();
        symbols.sort();
        for symbol in symbols {
            for record in index[symbol].values() {
                contents.push_str(&serde_json::to_string(record)?);
                contents.push('\n');
            }
        }

        let tmp_path = disk_file.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, disk_file).await?;

        debug!("Compacted hot store file {} ({} expired)", disk_file.display(), removed);
        Ok(removed)
    }

    /// Append record to disk (JSONL format)
    async fn append_to_disk(&self, record: &MinuteRecord) -> Result<()> {
        let Some(disk_file) = &self.disk_file else {
            return Ok(());
        };

        if let Some(parent) = disk_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(disk_file)
            .await?;

        let json_line = serde_json::to_string(record)?;
        file.write_all(format!("{}\n", json_line).as_bytes()).await?;
        file.sync_all().await?;

        Ok(())
    }
}

#[async_trait]
impl HotStore for FileHotStore {
    async fn put(&self, record: &MinuteRecord) -> Result<()> {
        let mut index = self.index.write().await;

        // Write to disk first so memory never holds what the log lacks
        self.append_to_disk(record).await?;

        index
            .entry(record.symbol.clone())
            .or_default()
            .insert(record.epoch_seconds, record.clone());

        Ok(())
    }

    async fn query_page(
        &self,
        symbol: &str,
        start_epoch: i64,
        end_epoch: i64,
        exclusive_start: Option<i64>,
        limit: usize,
    ) -> Result<Page> {
        let limit = limit.max(1);
        let lower = match exclusive_start {
            Some(key) if key >= start_epoch => Bound::Excluded(key),
            _ => Bound::Included(start_epoch),
        };
        let lower_value = match lower {
            Bound::Excluded(v) | Bound::Included(v) => v,
            Bound::Unbounded => start_epoch,
        };
        if lower_value > end_epoch {
            return Ok(Page::default());
        }

        let now = (self.clock)();
        let index = self.index.read().await;
        let Some(records) = index.get(symbol) else {
            return Ok(Page::default());
        };

        let mut items: Vec<RawPoint> = records
            .range((lower, Bound::Included(end_epoch)))
            .filter(|(_, record)| !record.is_expired(now))
            .take(limit + 1)
            .map(|(ts, record)| RawPoint::new(*ts, record.price))
            .collect();

        let last_evaluated = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|p| p.epoch_seconds)
        } else {
            None
        };

        Ok(Page {
            items,
            last_evaluated,
        })
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn expire(&self) -> Result<usize> {
        self.compact().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_736_950_000;

    fn fixed_clock() -> i64 {
        NOW
    }

    fn record(symbol: &str, ts: i64, price: f64) -> MinuteRecord {
        MinuteRecord {
            symbol: symbol.to_string(),
            epoch_seconds: ts,
            price,
            expiry_epoch: ts + 60 * 86_400,
        }
    }

    #[tokio::test]
    async fn test_query_range_stitches_pages() {
        let store = FileHotStore::in_memory(4).with_clock(fixed_clock);
        for i in 0..10 {
            store.put(&record("AAPL", NOW - 600 + i * 60, i as f64)).await.unwrap();
        }
        store.put(&record("MSFT", NOW - 600, 1.0)).await.unwrap();

        let first = store.query_page("AAPL", 0, NOW, None, 4).await.unwrap();
        assert_eq!(first.items.len(), 4);
        assert_eq!(first.last_evaluated, Some(NOW - 600 + 3 * 60));

        let all = store.query_range("AAPL", 0, NOW).await.unwrap();
        assert_eq!(all.len(), 10);
        assert!(all.windows(2).all(|w| w[0].epoch_seconds < w[1].epoch_seconds));
        assert_eq!(all[9].price, 9.0);
    }

    #[tokio::test]
    async fn test_range_bounds_are_inclusive() {
        let store = FileHotStore::in_memory(100).with_clock(fixed_clock);
        for ts in [NOW - 180, NOW - 120, NOW - 60] {
            store.put(&record("X", ts, ts as f64)).await.unwrap();
        }

        let points = store.query_range("X", NOW - 180, NOW - 120).await.unwrap();
        assert_eq!(points.len(), 2);

        assert!(store.query_range("X", NOW, NOW - 60).await.unwrap().is_empty());
        assert!(store.query_range("Y", 0, NOW).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_same_key() {
        let store = FileHotStore::in_memory(100).with_clock(fixed_clock);
        store.put(&record("X", NOW - 60, 1.0)).await.unwrap();
        store.put(&record("X", NOW - 60, 2.0)).await.unwrap();

        let points = store.query_range("X", 0, NOW).await.unwrap();
        assert_eq!(points, vec![RawPoint::new(NOW - 60, 2.0)]);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_records_are_hidden_and_purged() {
        let store = FileHotStore::in_memory(100).with_clock(fixed_clock);
        let mut stale = record("X", NOW - 120, 1.0);
        stale.expiry_epoch = NOW - 1;
        store.put(&stale).await.unwrap();
        store.put(&record("X", NOW - 60, 2.0)).await.unwrap();

        let points = store.query_range("X", 0, NOW).await.unwrap();
        assert_eq!(points.len(), 1);

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_expire_releases_memory_without_disk() {
        let store = FileHotStore::in_memory(100).with_clock(fixed_clock);
        for ts in 0..5 {
            let mut stale = record("X", 60 * ts, 1.0);
            stale.expiry_epoch = 100;
            store.put(&stale).await.unwrap();
        }
        store.put(&record("X", NOW - 60, 2.0)).await.unwrap();

        assert_eq!(store.record_count().await, 6);
        assert_eq!(store.expire().await.unwrap(), 5);
        assert_eq!(store.record_count().await, 1);
        assert_eq!(store.expire().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disk_round_trip_and_compact() {
        let dir = std::env::temp_dir().join(format!("quoteflow-hot-{}", uuid::Uuid::new_v4()));
        let path = dir.join("intraday.jsonl");

        let store = FileHotStore::new(path.clone(), 100).with_clock(fixed_clock);
        store.put(&record("X", NOW - 120, 1.0)).await.unwrap();
        store.put(&record("X", NOW - 60, 2.0)).await.unwrap();
        store.put(&record("X", NOW - 60, 3.0)).await.unwrap();
        let mut stale = record("Y", NOW - 60, 9.0);
        stale.expiry_epoch = NOW - 1;
        store.put(&stale).await.unwrap();

        let reloaded = FileHotStore::new(path.clone(), 100).with_clock(fixed_clock);
        assert_eq!(reloaded.load_from_disk().await.unwrap(), 3);
        assert_eq!(
            reloaded.query_range("X", 0, NOW).await.unwrap(),
            vec![RawPoint::new(NOW - 120, 1.0), RawPoint::new(NOW - 60, 3.0)]
        );

        assert_eq!(store.compact().await.unwrap(), 1);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"ts\""));

        let _ = std::fs::remove_dir_all(dir);
    }
}
