/// Read raw points back out of the date-partitioned archive
use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::archive::batcher::day_prefix;
use crate::archive::codec::decode_ticks;
use crate::archive::store::ObjectStore;
use crate::error::Result;
use crate::types::RawPoint;

pub struct ArchiveReader {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl ArchiveReader {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: Option<String>) -> Self {
        ArchiveReader { store, prefix }
    }

    /// Every archived observation of `symbol` with `start <= ts <= end`, ascending.
    /// Unreadable or corrupt objects are logged and skipped.
    pub async fn read_points(&self, symbol: &str, start: &DateTime<Tz>, end: &DateTime<Tz>) -> Result<Vec<RawPoint>> {
        let start_epoch = start.timestamp();
        let end_epoch = end.timestamp();
        if start_epoch > end_epoch {
            return Ok(Vec::new());
        }

        let mut points = Vec::new();
        let mut objects = 0usize;

        // Objects are keyed by flush time, which trails the ticks they hold,
        // so the day after `end` is scanned too
        let mut day = start.date_naive();
        let last_day = end.date_naive().succ_opt().unwrap_or(end.date_naive());

        while day <= last_day {
            let prefix = day_prefix(self.prefix.as_deref(), day);
            for key in self.store.list_objects(&prefix).await? {
                let payload = match self.store.get_object(&key).await {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Skipping unreadable archive object {}: {}", key, e);
                        continue;
                    }
                };
                let ticks = match decode_ticks(payload) {
                    Ok(ticks) => ticks,
                    Err(e) => {
                        warn!("Skipping corrupt archive object {}: {}", key, e);
                        continue;
                    }
                };

                objects += 1;
                points.extend(
                    ticks
                        .iter()
                        .filter(|t| t.symbol == symbol)
                        .map(|t| RawPoint::new(t.timestamp.timestamp(), t.price))
                        .filter(|p| p.epoch_seconds >= start_epoch && p.epoch_seconds <= end_epoch),
                );
            }

            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        points.sort_by_key(|p| p.epoch_seconds);
        debug!(
            "Archive read: symbol={}, {} objects -> {} points",
            symbol,
            objects,
            points.len()
        );
        Ok(points)
    }
}
