/// Polling worker: quote source -> normalizer -> {minute aggregator -> hot store,
/// archive batcher -> object store}
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveBatcher, FsObjectStore, ObjectStore};
use crate::control::FileServiceScaler;
use crate::data::{FileHotStore, HotStore, SharedMinuteAggregator};
use crate::error::Result;
use crate::source::{load_metadata, HttpQuoteSource, QuoteNormalizer, QuoteSource};
use crate::time::{is_market_open, next_market_open, now_in_display_tz};
use crate::types::{CanonicalTick, Config, MinuteRecord};

/// Counters for one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub normalized: usize,
    pub records_emitted: usize,
    pub records_persisted: usize,
}

pub struct Worker {
    config: Arc<Config>,
    source: Arc<dyn QuoteSource>,
    normalizer: QuoteNormalizer,
    aggregator: SharedMinuteAggregator,
    hot_store: Option<Arc<dyn HotStore>>,
    batcher: ArchiveBatcher,
    control: Option<Arc<FileServiceScaler>>,
    shutdown: Arc<RwLock<bool>>,
}

impl Worker {
    /// Wire a worker from its collaborators; symbol metadata is loaded here, once
    pub async fn new(
        config: Arc<Config>,
        source: Arc<dyn QuoteSource>,
        hot_store: Option<Arc<dyn HotStore>>,
        archive: Arc<dyn ObjectStore>,
        control: Option<Arc<FileServiceScaler>>,
    ) -> Self {
        let metadata = load_metadata(source.as_ref(), &config.symbols).await;
        let normalizer = QuoteNormalizer::new(source.name(), metadata);

        Worker {
            aggregator: SharedMinuteAggregator::new(config.intraday_ttl_days),
            batcher: ArchiveBatcher::new(archive, config.archive_prefix.clone()),
            normalizer,
            source,
            hot_store,
            control,
            config,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Production wiring: HTTP source, optional file hot store, filesystem archive
    pub async fn from_config(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let source = Arc::new(HttpQuoteSource::new(
            &config.quote_endpoint,
            Duration::from_secs(config.http_timeout_sec),
        )?);

        let hot_store: Option<Arc<dyn HotStore>> = match &config.hot_store_path {
            Some(path) => {
                let store = FileHotStore::new(PathBuf::from(path), config.hot_store_page_size);
                let loaded = store.load_from_disk().await?;
                store.compact().await?;
                info!("Hot store ready at {} ({} live records)", path, loaded);
                Some(Arc::new(store) as Arc<dyn HotStore>)
            }
            None => {
                warn!("No hot_store_path configured - finalized minutes will not be stored");
                None
            }
        };

        let archive = Arc::new(FsObjectStore::new(&config.archive_root));
        let control = Arc::new(FileServiceScaler::new(&config.control_state_path, "stock-worker"));

        Ok(Worker::new(config, source, hot_store, archive, Some(control)).await)
    }

    pub fn shutdown_handle(&self) -> Arc<RwLock<bool>> {
        Arc::clone(&self.shutdown)
    }

    pub async fn request_shutdown(&self) {
        *self.shutdown.write().await = true;
    }

    async fn shutdown_requested(&self) -> bool {
        *self.shutdown.read().await
    }

    pub fn aggregator(&self) -> &SharedMinuteAggregator {
        &self.aggregator
    }

    pub fn batcher(&self) -> &ArchiveBatcher {
        &self.batcher
    }

    /// Whether a cycle at `now` should poll upstream
    pub async fn should_poll(&self, now: &DateTime<Tz>) -> bool {
        if let Some(control) = &self.control {
            if !control.is_enabled().await {
                debug!("Worker switched off - skipping cycle");
                return false;
            }
        }

        if self.config.market_hours_only && !is_market_open(now) {
            debug!(
                "Market closed - next open {:?}",
                next_market_open(now).map(|t| t.to_rfc3339())
            );
            return false;
        }

        true
    }

    /// One polling cycle. Every failure is per symbol or per record and only logged.
    pub async fn run_cycle(&self, observed_at: DateTime<Tz>) -> CycleReport {
        let fetches = self.source.fetch_quotes(&self.config.symbols).await;
        let fetched = fetches.iter().filter(|f| f.result.is_ok()).count();

        let ticks = self.normalizer.normalize_batch(fetches, observed_at);
        self.batcher.append(&ticks).await;

        let mut report = CycleReport {
            fetched,
            normalized: ticks.len(),
            ..Default::default()
        };

        for tick in &ticks {
            self.log_tick(tick);
            if let Some(record) = self.aggregator.ingest(tick).await {
                report.records_emitted += 1;
                if self.persist(&record).await {
                    report.records_persisted += 1;
                }
            }
        }

        report
    }

    fn log_tick(&self, tick: &CanonicalTick) {
        debug!(
            "{} {} price={} volume={:?}",
            tick.timestamp.format("%H:%M:%S"),
            tick.symbol,
            tick.price,
            tick.volume
        );
    }

    // Write failures lose the minute; aggregator state is never rolled back
    async fn persist(&self, record: &MinuteRecord) -> bool {
        let Some(store) = &self.hot_store else {
            return false;
        };

        match store.put(record).await {
            Ok(()) => {
                debug!(
                    "Stored minute {} @ {} -> {}",
                    record.symbol, record.epoch_seconds, record.price
                );
                true
            }
            Err(e) => {
                error!(
                    "Error writing minute {} @ {}: {} ({})",
                    record.symbol,
                    record.epoch_seconds,
                    e,
                    e.error_code()
                );
                false
            }
        }
    }

    /// Flush the archive buffer, logging failures (the buffer is kept for the next try)
    pub async fn flush_archive(&self, now: &DateTime<Tz>) -> Option<String> {
        match self.batcher.flush(now).await {
            Ok(key) => key,
            Err(e) => {
                error!("Archive flush failed: {} ({})", e, e.error_code());
                None
            }
        }
    }

    /// Release expired hot store records; failures are logged and retried next interval
    pub async fn maintain_hot_store(&self) -> usize {
        let Some(store) = &self.hot_store else {
            return 0;
        };

        match store.expire().await {
            Ok(removed) => {
                if removed > 0 {
                    info!("🧹 Expired {} hot store records", removed);
                }
                removed
            }
            Err(e) => {
                error!("Hot store maintenance failed: {} ({})", e, e.error_code());
                0
            }
        }
    }

    /// Poll until Ctrl+C or `request_shutdown`, then run the shutdown sequence
    pub async fn run(&self) -> Result<()> {
        info!(
            "🚀 Worker starting: {} symbols, poll every {}s, archive every {}s",
            self.config.symbols.len(),
            self.config.poll_interval_sec,
            self.config.archive_flush_interval_sec
        );

        let mut poll = tokio::time::interval(Duration::from_secs(self.config.poll_interval_sec));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let flush_period = Duration::from_secs(self.config.archive_flush_interval_sec);
        let mut flush = tokio::time::interval_at(tokio::time::Instant::now() + flush_period, flush_period);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let maintenance_period = Duration::from_secs(self.config.hot_store_maintenance_interval_sec);
        let mut maintenance =
            tokio::time::interval_at(tokio::time::Instant::now() + maintenance_period, maintenance_period);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            if self.shutdown_requested().await {
                info!("Shutdown requested");
                break;
            }

            tokio::select! {
                _ = poll.tick() => {
                    let now = now_in_display_tz();
                    if self.should_poll(&now).await {
                        let report = self.run_cycle(now).await;
                        debug!("Cycle: {:?}", report);
                    }
                }
                _ = flush.tick() => {
                    self.flush_archive(&now_in_display_tz()).await;
                }
                _ = maintenance.tick() => {
                    self.maintain_hot_store().await;
                }
                signal = &mut ctrl_c => {
                    match signal {
                        Ok(()) => info!("Ctrl+C received - initiating graceful shutdown"),
                        Err(e) => warn!("Signal listener failed: {} - shutting down", e),
                    }
                    break;
                }
            }
        }

        self.shutdown_sequence().await
    }

    /// Optionally flush each symbol's in-progress minute, then drain the archive buffer
    pub async fn shutdown_sequence(&self) -> Result<()> {
        info!("Starting shutdown sequence...");

        if self.config.flush_partial_minute_on_shutdown {
            let partials = self.aggregator.finalize_all().await;
            info!("Flushing {} in-progress minutes", partials.len());
            for record in &partials {
                self.persist(record).await;
            }
        } else {
            info!("Dropping in-progress minutes (flush_partial_minute_on_shutdown=false)");
        }

        self.batcher.flush(&now_in_display_tz()).await?;

        info!("Shutdown sequence completed");
        Ok(())
    }
}
