/// Quote normalization: priority-ordered field aliases resolved into one canonical tick
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::source::{RawQuote, SymbolFetch};
use crate::time::DISPLAY_TZ;
use crate::types::{CanonicalTick, SymbolMetadata};

pub const PRICE_FIELDS: &[&str] = &["lastPrice", "last_price", "regularMarketPrice"];
pub const VOLUME_FIELDS: &[&str] = &["lastVolume", "last_volume", "regularMarketVolume", "volume"];
pub const OPEN_FIELDS: &[&str] = &["open", "regularMarketOpen"];
pub const DAY_HIGH_FIELDS: &[&str] = &["dayHigh", "day_high", "regularMarketDayHigh"];
pub const DAY_LOW_FIELDS: &[&str] = &["dayLow", "day_low", "regularMarketDayLow"];
pub const PREVIOUS_CLOSE_FIELDS: &[&str] =
    &["previousClose", "previous_close", "regularMarketPreviousClose"];
pub const TIMESTAMP_FIELDS: &[&str] = &["regularMarketTime", "timestamp", "time"];

// Numeric timestamps above this are milliseconds
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// First candidate key that is present and not null
fn first_value<'a>(raw: &'a RawQuote, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn optional_f64(raw: &RawQuote, candidates: &[&str]) -> Option<f64> {
    first_value(raw, candidates)
        .and_then(as_f64)
        .filter(|v| v.is_finite())
}

fn optional_string(raw: &RawQuote, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn parse_timestamp(symbol: &str, value: &Value) -> Result<DateTime<Tz>> {
    let invalid = || PipelineError::InvalidTimestamp {
        symbol: symbol.to_string(),
        value: value.to_string(),
    };

    let utc = match value {
        Value::Number(n) => {
            // floats outside i64 would saturate on the cast
            let raw = n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                })
                .ok_or_else(invalid)?;
            if raw.unsigned_abs() >= MILLIS_THRESHOLD.unsigned_abs() {
                DateTime::<Utc>::from_timestamp_millis(raw)
            } else {
                DateTime::<Utc>::from_timestamp(raw, 0)
            }
            .ok_or_else(invalid)?
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map_err(|_| invalid())?
            .with_timezone(&Utc),
        _ => return Err(invalid()),
    };

    Ok(utc.with_timezone(&DISPLAY_TZ))
}

/// Metadata from an upstream info payload
pub fn metadata_from_info(info: &RawQuote) -> SymbolMetadata {
    SymbolMetadata {
        exchange: optional_string(info, "exchange"),
        currency: optional_string(info, "currency"),
        short_name: optional_string(info, "shortName"),
    }
}

/// Maps raw upstream quotes into canonical ticks, merging static metadata
pub struct QuoteNormalizer {
    source: String,
    metadata: HashMap<String, SymbolMetadata>,
}

impl QuoteNormalizer {
    pub fn new(source: impl Into<String>, metadata: HashMap<String, SymbolMetadata>) -> Self {
        QuoteNormalizer {
            source: source.into(),
            metadata,
        }
    }

    /// Normalize one quote. `observed_at` is used when the payload carries no timestamp.
    pub fn normalize(&self, symbol: &str, raw: &RawQuote, observed_at: DateTime<Tz>) -> Result<CanonicalTick> {
        let price_value =
            first_value(raw, PRICE_FIELDS).ok_or_else(|| PipelineError::MissingPrice(symbol.to_string()))?;
        let price = as_f64(price_value)
            .filter(|p| p.is_finite())
            .ok_or_else(|| PipelineError::InvalidPrice {
                symbol: symbol.to_string(),
                value: price_value.to_string(),
            })?;

        let timestamp = match first_value(raw, TIMESTAMP_FIELDS) {
            Some(value) => parse_timestamp(symbol, value)?,
            None => observed_at,
        };

        let meta = self.metadata.get(symbol).cloned().unwrap_or_default();

        Ok(CanonicalTick {
            symbol: symbol.to_string(),
            timestamp,
            price,
            volume: optional_f64(raw, VOLUME_FIELDS),
            open: optional_f64(raw, OPEN_FIELDS),
            day_high: optional_f64(raw, DAY_HIGH_FIELDS),
            day_low: optional_f64(raw, DAY_LOW_FIELDS),
            previous_close: optional_f64(raw, PREVIOUS_CLOSE_FIELDS),
            exchange: meta.exchange,
            currency: meta.currency,
            short_name: meta.short_name,
            source: self.source.clone(),
        })
    }

    /// Normalize a polling batch, logging and skipping failed symbols
    pub fn normalize_batch(&self, fetches: Vec<SymbolFetch>, observed_at: DateTime<Tz>) -> Vec<CanonicalTick> {
        let mut ticks = Vec::with_capacity(fetches.len());

        for fetch in fetches {
            let raw = match fetch.result {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Error fetching {}: {} ({})", fetch.symbol, e, e.error_code());
                    continue;
                }
            };

            match self.normalize(&fetch.symbol, &raw, observed_at) {
                Ok(tick) => ticks.push(tick),
                Err(PipelineError::MissingPrice(symbol)) => {
                    warn!("Price missing for {}, skipping this tick", symbol);
                }
                Err(e) => {
                    warn!("Rejected quote for {}: {} ({})", fetch.symbol, e, e.error_code());
                }
            }
        }

        debug!("Normalized {} ticks", ticks.len());
        ticks
    }
}
