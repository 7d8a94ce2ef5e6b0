/// Core type definitions for the quote pipeline
use std::str::FromStr;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::time::{epoch_to_display, RangeToken};

/// One normalized price observation for one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalTick {
    pub symbol: String,
    pub timestamp: DateTime<Tz>,
    pub price: f64,

    // dynamic quote fields
    pub volume: Option<f64>,
    pub open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub previous_close: Option<f64>,

    // static metadata
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub short_name: Option<String>,
    pub source: String,
}

impl CanonicalTick {
    /// Tick carrying only the fields the aggregator needs
    pub fn bare(symbol: impl Into<String>, timestamp: DateTime<Tz>, price: f64) -> Self {
        CanonicalTick {
            symbol: symbol.into(),
            timestamp,
            price,
            volume: None,
            open: None,
            day_high: None,
            day_low: None,
            previous_close: None,
            exchange: None,
            currency: None,
            short_name: None,
            source: String::new(),
        }
    }
}

/// Relatively static per-symbol metadata, loaded once at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetadata {
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub short_name: Option<String>,
}

/// Minute currently held for one symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinuteState {
    pub minute_start: DateTime<Tz>,
    pub last_price: f64,
}

/// Finalized minute written to the hot store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteRecord {
    pub symbol: String,
    #[serde(rename = "ts")]
    pub epoch_seconds: i64,
    pub price: f64,
    #[serde(rename = "ttl")]
    pub expiry_epoch: i64,
}

impl MinuteRecord {
    pub fn is_expired(&self, now_epoch: i64) -> bool {
        self.expiry_epoch <= now_epoch
    }
}

/// Raw `(timestamp, price)` observation fed to the resampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub epoch_seconds: i64,
    pub price: f64,
}

impl RawPoint {
    pub fn new(epoch_seconds: i64, price: f64) -> Self {
        RawPoint { epoch_seconds, price }
    }
}

/// Bucketed output point, `t` is the bucket start in the display zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub t: DateTime<Tz>,
    pub price: f64,
}

impl Point {
    pub fn epoch_seconds(&self) -> i64 {
        self.t.timestamp()
    }

    pub fn to_raw(&self) -> RawPoint {
        RawPoint::new(self.epoch_seconds(), self.price)
    }

    pub fn from_raw(raw: RawPoint) -> Option<Self> {
        epoch_to_display(raw.epoch_seconds).map(|t| Point { t, price: raw.price })
    }
}

/// Query response body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub range: RangeToken,
    pub points: Vec<Point>,
}

/// Where the query service reads raw points from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Hot,
    Archive,
}

impl DataSource {
    pub fn as_str(&self) -> &str {
        match self {
            DataSource::Hot => "hot",
            DataSource::Archive => "archive",
        }
    }
}

impl FromStr for DataSource {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(DataSource::Hot),
            "archive" => Ok(DataSource::Archive),
            other => Err(PipelineError::InvalidParameter(format!(
                "unknown data source '{}' (expected hot or archive)",
                other
            ))),
        }
    }
}

/// Configuration for the worker, query service and control switch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Symbols & Upstream
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_quote_endpoint")]
    pub quote_endpoint: String,
    #[serde(default = "default_http_timeout_sec")]
    pub http_timeout_sec: u64,

    // Cadence
    #[serde(default = "default_poll_interval_sec")]
    pub poll_interval_sec: u64,
    #[serde(default = "default_archive_flush_interval_sec")]
    pub archive_flush_interval_sec: u64,
    #[serde(default)]
    pub market_hours_only: bool,
    #[serde(default = "default_true")]
    pub flush_partial_minute_on_shutdown: bool,

    // Hot Store
    #[serde(default)]
    pub hot_store_path: Option<String>,
    #[serde(default = "default_intraday_ttl_days")]
    pub intraday_ttl_days: i64,
    #[serde(default = "default_hot_store_page_size")]
    pub hot_store_page_size: usize,
    #[serde(default = "default_hot_store_maintenance_interval_sec")]
    pub hot_store_maintenance_interval_sec: u64,

    // Archive
    #[serde(default = "default_archive_root")]
    pub archive_root: String,
    #[serde(default)]
    pub archive_prefix: Option<String>,

    // Query
    #[serde(default = "default_query_source")]
    pub query_source: String,

    // Control
    #[serde(default = "default_control_state_path")]
    pub control_state_path: String,
    #[serde(default)]
    pub notification_log_path: Option<String>,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Config {
    pub fn data_source(&self) -> DataSource {
        self.query_source.parse().unwrap_or(DataSource::Hot)
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.intraday_ttl_days * 86_400
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            symbols: default_symbols(),
            quote_endpoint: default_quote_endpoint(),
            http_timeout_sec: default_http_timeout_sec(),
            poll_interval_sec: default_poll_interval_sec(),
            archive_flush_interval_sec: default_archive_flush_interval_sec(),
            market_hours_only: false,
            flush_partial_minute_on_shutdown: true,
            hot_store_path: None,
            intraday_ttl_days: default_intraday_ttl_days(),
            hot_store_page_size: default_hot_store_page_size(),
            hot_store_maintenance_interval_sec: default_hot_store_maintenance_interval_sec(),
            archive_root: default_archive_root(),
            archive_prefix: None,
            query_source: default_query_source(),
            control_state_path: default_control_state_path(),
            notification_log_path: None,
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_symbols() -> Vec<String> {
    ["AAPL", "NVDA", "TSLA", "NFLX", "META", "MSFT", "GOOG", "AMZN", "ORCL", "AVGO"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_quote_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_http_timeout_sec() -> u64 {
    10
}

fn default_poll_interval_sec() -> u64 {
    3
}

fn default_archive_flush_interval_sec() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_intraday_ttl_days() -> i64 {
    60
}

fn default_hot_store_page_size() -> usize {
    1_000
}

fn default_hot_store_maintenance_interval_sec() -> u64 {
    3_600
}

fn default_archive_root() -> String {
    "data/archive".to_string()
}

fn default_query_source() -> String {
    "hot".to_string()
}

fn default_control_state_path() -> String {
    "data/worker_state.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
