/// Price query service: range token -> raw points (hot store or archive) -> resampled series
use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::info;

use crate::archive::ArchiveReader;
use crate::data::{resample, HotStore};
use crate::error::{PipelineError, Result};
use crate::time::{now_in_display_tz, resolve_at, RangeToken};
use crate::types::{DataSource, PriceSeries, RawPoint};

/// Validated request parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub symbol: String,
    pub range: RangeToken,
}

impl PriceQuery {
    pub fn new(symbol: impl Into<String>, range: RangeToken) -> Self {
        PriceQuery {
            symbol: symbol.into(),
            range,
        }
    }

    /// `symbol` is required; `range` defaults to 1D
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let symbol = params
            .get("symbol")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or(PipelineError::MissingSymbol)?;

        let range = match params.get("range") {
            Some(token) => token.parse::<RangeToken>()?,
            None => RangeToken::OneDay,
        };

        Ok(PriceQuery::new(symbol, range))
    }
}

/// Where raw points come from
pub enum PointSource {
    Hot(Arc<dyn HotStore>),
    Archive(ArchiveReader),
}

pub struct QueryService {
    source: PointSource,
}

impl QueryService {
    pub fn new(source: PointSource) -> Self {
        QueryService { source }
    }

    pub fn data_source(&self) -> DataSource {
        match self.source {
            PointSource::Hot(_) => DataSource::Hot,
            PointSource::Archive(_) => DataSource::Archive,
        }
    }

    pub async fn handle(&self, params: &HashMap<String, String>) -> Result<PriceSeries> {
        let query = PriceQuery::from_params(params)?;
        self.get_prices(&query).await
    }

    pub async fn get_prices(&self, query: &PriceQuery) -> Result<PriceSeries> {
        self.get_prices_at(query, now_in_display_tz()).await
    }

    /// Same as `get_prices` with "now" supplied by the caller
    pub async fn get_prices_at(&self, query: &PriceQuery, now: DateTime<Tz>) -> Result<PriceSeries> {
        let spec = resolve_at(query.range.as_str(), now)?;

        let raw: Vec<RawPoint> = match &self.source {
            PointSource::Hot(store) => {
                store
                    .query_range(&query.symbol, spec.start_epoch(), spec.end_epoch())
                    .await?
            }
            PointSource::Archive(reader) => {
                reader
                    .read_points(&query.symbol, &spec.start, &spec.end)
                    .await?
            }
        };

        let points = resample(&raw, spec.bucket_width);

        info!(
            "📈 {} {} from {}: {} raw -> {} points",
            query.symbol,
            query.range,
            self.data_source().as_str(),
            raw.len(),
            points.len()
        );

        Ok(PriceSeries {
            symbol: query.symbol.clone(),
            range: query.range,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveBatcher, MemoryObjectStore};
    use crate::data::FileHotStore;
    use crate::time::DISPLAY_TZ;
    use crate::types::{CanonicalTick, MinuteRecord};
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn now() -> DateTime<Tz> {
        DISPLAY_TZ.with_ymd_and_hms(2025, 2, 4, 16, 0, 0).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Tz> {
        DISPLAY_TZ.with_ymd_and_hms(2025, 2, 4, h, m, s).unwrap()
    }

    // 2100-01-01, never expired under the system clock
    fn far_future() -> i64 {
        4_102_444_800
    }

    #[test]
    fn test_from_params() {
        let query = PriceQuery::from_params(&params(&[("symbol", "AAPL")])).unwrap();
        assert_eq!(query.range, RangeToken::OneDay);

        let query = PriceQuery::from_params(&params(&[("symbol", "NVDA"), ("range", "1M")])).unwrap();
        assert_eq!(query, PriceQuery::new("NVDA", RangeToken::OneMonth));

        let missing = PriceQuery::from_params(&params(&[("range", "1W")])).unwrap_err();
        assert!(matches!(missing, PipelineError::MissingSymbol));
        assert_eq!(missing.status_code(), 400);

        let blank = PriceQuery::from_params(&params(&[("symbol", "  ")])).unwrap_err();
        assert!(matches!(blank, PipelineError::MissingSymbol));

        let bad_range = PriceQuery::from_params(&params(&[("symbol", "AAPL"), ("range", "5Y")])).unwrap_err();
        assert!(matches!(bad_range, PipelineError::UnsupportedRange(r) if r == "5Y"));
    }

    #[tokio::test]
    async fn test_hot_store_series() {
        let store = Arc::new(FileHotStore::in_memory(2));
        for (ts, price) in [
            (at(9, 0, 0), 10.0),
            (at(9, 1, 0), 11.0),
            (at(9, 31, 0), 12.0),
            (at(9, 59, 0), 13.0),
            (at(10, 0, 0), 14.0),
        ] {
            store
                .put(&MinuteRecord {
                    symbol: "AAPL".to_string(),
                    epoch_seconds: ts.timestamp(),
                    price,
                    expiry_epoch: far_future(),
                })
                .await
                .unwrap();
        }

        let service = QueryService::new(PointSource::Hot(store));
        assert_eq!(service.data_source(), DataSource::Hot);

        let series = service
            .get_prices_at(&PriceQuery::new("AAPL", RangeToken::OneWeek), now())
            .await
            .unwrap();

        let got: Vec<(DateTime<Tz>, f64)> = series.points.iter().map(|p| (p.t, p.price)).collect();
        assert_eq!(
            got,
            vec![(at(9, 0, 0), 11.0), (at(9, 30, 0), 13.0), (at(10, 0, 0), 14.0)]
        );

        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["range"], "1W");
        assert_eq!(json["points"][0]["t"], "2025-02-04T09:00:00-05:00");
    }

    #[tokio::test]
    async fn test_archive_series_resamples_raw_ticks() {
        let store = Arc::new(MemoryObjectStore::new());
        let batcher = ArchiveBatcher::new(store.clone(), None);
        batcher
            .append(&[
                CanonicalTick::bare("AAPL", at(9, 0, 10), 10.0),
                CanonicalTick::bare("AAPL", at(9, 0, 50), 11.0),
                CanonicalTick::bare("MSFT", at(9, 0, 55), 99.0),
                CanonicalTick::bare("AAPL", at(9, 31, 0), 12.0),
            ])
            .await;
        batcher.flush(&at(9, 32, 0)).await.unwrap();

        let service = QueryService::new(PointSource::Archive(ArchiveReader::new(store, None)));
        let series = service
            .get_prices_at(&PriceQuery::new("AAPL", RangeToken::OneWeek), now())
            .await
            .unwrap();

        let got: Vec<(DateTime<Tz>, f64)> = series.points.iter().map(|p| (p.t, p.price)).collect();
        assert_eq!(got, vec![(at(9, 0, 0), 11.0), (at(9, 30, 0), 12.0)]);
    }

    #[tokio::test]
    async fn test_empty_series() {
        let service = QueryService::new(PointSource::Hot(Arc::new(FileHotStore::in_memory(10))));
        let series = service
            .handle(&params(&[("symbol", "TSLA")]))
            .await
            .unwrap();
        assert_eq!(series.symbol, "TSLA");
        assert!(series.points.is_empty());
    }
}
