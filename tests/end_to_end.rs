//! Worker -> stores -> query service, driven by a scripted quote source

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use serde_json::json;

use quoteflow::archive::{ArchiveReader, MemoryObjectStore};
use quoteflow::data::{FileHotStore, HotStore};
use quoteflow::query::{PointSource, PriceQuery, QueryService};
use quoteflow::source::{RawQuote, ScriptedQuoteSource};
use quoteflow::time::{RangeToken, DISPLAY_TZ};
use quoteflow::worker::Worker;
use quoteflow::Config;

fn at(h: u32, m: u32, s: u32) -> DateTime<Tz> {
    DISPLAY_TZ.with_ymd_and_hms(2025, 2, 4, h, m, s).unwrap()
}

// 2025-02-04 16:00 New York, keeps test minutes inside their TTL
fn session_close() -> i64 {
    1_738_702_800
}

fn quote(price: f64, ts: DateTime<Tz>) -> RawQuote {
    json!({
        "regularMarketPrice": price,
        "regularMarketVolume": 1_000,
        "regularMarketTime": ts.timestamp()
    })
    .as_object()
    .cloned()
    .unwrap()
}

struct Pipeline {
    source: Arc<ScriptedQuoteSource>,
    hot: Arc<FileHotStore>,
    archive: Arc<MemoryObjectStore>,
    worker: Worker,
}

async fn pipeline(symbols: &[&str]) -> Pipeline {
    let config = Arc::new(Config {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        ..Config::default()
    });
    let source = Arc::new(ScriptedQuoteSource::new());
    let hot = Arc::new(FileHotStore::in_memory(3).with_clock(session_close));
    let archive = Arc::new(MemoryObjectStore::new());

    let worker = Worker::new(
        config,
        source.clone(),
        Some(hot.clone() as Arc<dyn HotStore>),
        archive.clone(),
        None,
    )
    .await;

    Pipeline {
        source,
        hot,
        archive,
        worker,
    }
}

#[tokio::test]
async fn minutes_flow_from_worker_to_query() {
    let p = pipeline(&["AAPL", "MSFT"]).await;

    // 12 minutes of AAPL, two ticks per minute; MSFT fails every poll
    for minute in 0..12u32 {
        for (second, bump) in [(5u32, 0.0), (45u32, 0.5)] {
            let ts = at(9, 30 + minute, second);
            p.source.push_quote("AAPL", quote(100.0 + minute as f64 + bump, ts)).await;
            p.source.push_failure("MSFT", "HTTP 502").await;
            p.worker.run_cycle(ts).await;
        }
    }

    // 11 transitions crossed; the 12th minute is still held
    assert_eq!(p.hot.record_count().await, 11);
    assert_eq!(p.worker.aggregator().state("AAPL").await.unwrap().last_price, 111.5);

    let service = QueryService::new(PointSource::Hot(p.hot.clone()));
    let now = at(16, 0, 0);

    let day = service
        .get_prices_at(&PriceQuery::new("AAPL", RangeToken::OneDay), now)
        .await
        .unwrap();
    assert_eq!(day.points.len(), 11);
    assert_eq!(day.points[0].t, at(9, 30, 0));
    assert_eq!(day.points[0].price, 100.5);
    assert!(day.points.windows(2).all(|w| w[0].t < w[1].t));

    // 09:30 through 09:40 all fall in one half-hour bucket
    let week = service
        .get_prices_at(&PriceQuery::new("AAPL", RangeToken::OneWeek), now)
        .await
        .unwrap();
    assert_eq!(week.points.len(), 1);
    assert_eq!(week.points[0].t, at(9, 30, 0));
    assert_eq!(week.points[0].price, 110.5);

    let msft = service
        .get_prices_at(&PriceQuery::new("MSFT", RangeToken::OneDay), now)
        .await
        .unwrap();
    assert!(msft.points.is_empty());
}

#[tokio::test]
async fn archive_keeps_every_raw_tick() {
    let p = pipeline(&["NVDA"]).await;

    for (second, price) in [(10u32, 10.0), (50, 11.0)] {
        p.source.push_quote("NVDA", quote(price, at(9, 0, second))).await;
        p.worker.run_cycle(at(9, 0, second)).await;
    }
    let first = p.worker.flush_archive(&at(9, 1, 0)).await;
    assert!(first.is_some());

    // Nothing buffered: no object written
    assert_eq!(p.worker.flush_archive(&at(9, 2, 0)).await, None);

    p.source.push_quote("NVDA", quote(12.0, at(9, 31, 0))).await;
    p.worker.run_cycle(at(9, 31, 0)).await;
    p.worker.flush_archive(&at(9, 32, 0)).await;

    assert_eq!(p.archive.len().await, 2);

    let service = QueryService::new(PointSource::Archive(ArchiveReader::new(p.archive.clone(), None)));
    let mut params = HashMap::new();
    params.insert("symbol".to_string(), "NVDA".to_string());
    params.insert("range".to_string(), "1W".to_string());
    let query = PriceQuery::from_params(&params).unwrap();

    let series = service.get_prices_at(&query, at(16, 0, 0)).await.unwrap();
    let got: Vec<(DateTime<Tz>, f64)> = series.points.iter().map(|p| (p.t, p.price)).collect();
    assert_eq!(got, vec![(at(9, 0, 0), 11.0), (at(9, 30, 0), 12.0)]);
}

#[tokio::test]
async fn shutdown_flushes_held_minute_and_buffer() {
    let p = pipeline(&["TSLA"]).await;

    p.source.push_quote("TSLA", quote(250.0, at(11, 15, 20))).await;
    p.worker.run_cycle(at(11, 15, 20)).await;
    assert_eq!(p.hot.record_count().await, 0);

    p.worker.shutdown_sequence().await.unwrap();

    let stored = p
        .hot
        .query_range("TSLA", at(11, 0, 0).timestamp(), at(12, 0, 0).timestamp())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].epoch_seconds, at(11, 15, 0).timestamp());
    assert_eq!(p.archive.len().await, 1);
    assert_eq!(p.worker.batcher().buffered().await, 0);
}
