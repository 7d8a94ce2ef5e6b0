/// Archive batcher - buffers raw ticks and writes them as one partitioned
/// Parquet object per flush interval
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::archive::codec::encode_ticks;
use crate::archive::store::ObjectStore;
use crate::error::Result;
use crate::types::CanonicalTick;

fn with_prefix(prefix: Option<&str>, key: String) -> String {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(p) => format!("{}/{}", p, key),
        None => key,
    }
}

/// Key for a flush at `at`: `year=%Y/month=%m/day=%d/stocks-%H-%M-%S.parquet`
pub fn partition_key(prefix: Option<&str>, at: &DateTime<Tz>) -> String {
    with_prefix(
        prefix,
        at.format("year=%Y/month=%m/day=%d/stocks-%H-%M-%S.parquet").to_string(),
    )
}

/// `stocks-09-05-07.parquet` -> `stocks-09-05-07-{seq}.parquet`
fn sequenced_key(key: &str, seq: u32) -> String {
    match key.strip_suffix(".parquet") {
        Some(stem) => format!("{}-{}.parquet", stem, seq),
        None => format!("{}-{}", key, seq),
    }
}

/// Listing prefix covering every object flushed on `date`
pub fn day_prefix(prefix: Option<&str>, date: NaiveDate) -> String {
    with_prefix(prefix, date.format("year=%Y/month=%m/day=%d/").to_string())
}

pub struct ArchiveBatcher {
    buffer: Mutex<Vec<CanonicalTick>>,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
    // last base key handed out and how many flushes reused it
    last_key: Mutex<Option<(String, u32)>>,
}

impl ArchiveBatcher {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: Option<String>) -> Self {
        ArchiveBatcher {
            buffer: Mutex::new(Vec::new()),
            store,
            prefix,
            last_key: Mutex::new(None),
        }
    }

    pub async fn append(&self, ticks: &[CanonicalTick]) {
        if ticks.is_empty() {
            return;
        }
        let mut buffer = self.buffer.lock().await;
        buffer.extend_from_slice(ticks);
        debug!("Archive buffer: +{} ticks ({} buffered)", ticks.len(), buffer.len());
    }

    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Write the whole buffer as one object keyed by `now`.
    /// Returns the key written, or None when the buffer was empty.
    /// On failure the drained ticks go back to the front of the buffer.
    pub async fn flush(&self, now: &DateTime<Tz>) -> Result<Option<String>> {
        let drained = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                debug!("Archive flush skipped, buffer empty");
                return Ok(None);
            }
            std::mem::take(&mut *buffer)
        };

        let key = self.next_key(now).await;

        match self.write(&key, &drained).await {
            Ok(()) => {
                info!("💾 Archived {} ticks to {}", drained.len(), key);
                Ok(Some(key))
            }
            Err(e) => {
                let count = drained.len();
                let mut buffer = self.buffer.lock().await;
                let newer = std::mem::replace(&mut *buffer, drained);
                buffer.extend(newer);
                warn!(
                    "Archive write to {} failed, {} ticks requeued: {} ({})",
                    key,
                    count,
                    e,
                    e.error_code()
                );
                Err(e)
            }
        }
    }

    /// Flushes within the same second get `-1`, `-2`, ... so none overwrites another
    async fn next_key(&self, now: &DateTime<Tz>) -> String {
        let base = partition_key(self.prefix.as_deref(), now);
        let mut last = self.last_key.lock().await;

        let seq = match last.as_ref() {
            Some((key, seq)) if *key == base => seq + 1,
            _ => 0,
        };
        *last = Some((base.clone(), seq));

        if seq == 0 {
            base
        } else {
            sequenced_key(&base, seq)
        }
    }

    async fn write(&self, key: &str, ticks: &[CanonicalTick]) -> Result<()> {
        let payload = encode_ticks(ticks)?;
        self.store.put_object(key, payload).await
    }
}
