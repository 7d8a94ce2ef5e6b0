/// Range tokens and their lookback / bucket width table
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::time::{now_in_display_tz, BucketWidth};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeToken {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl RangeToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeToken::OneDay => "1D",
            RangeToken::OneWeek => "1W",
            RangeToken::OneMonth => "1M",
        }
    }

    pub fn lookback(&self) -> Duration {
        match self {
            RangeToken::OneDay => Duration::days(1),
            RangeToken::OneWeek => Duration::days(7),
            RangeToken::OneMonth => Duration::days(30),
        }
    }

    pub fn bucket_width(&self) -> BucketWidth {
        match self {
            RangeToken::OneDay => BucketWidth::MINUTE,
            RangeToken::OneWeek => BucketWidth::HALF_HOUR,
            RangeToken::OneMonth => BucketWidth::HOUR,
        }
    }
}

impl FromStr for RangeToken {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1D" => Ok(RangeToken::OneDay),
            "1W" => Ok(RangeToken::OneWeek),
            "1M" => Ok(RangeToken::OneMonth),
            other => Err(PipelineError::UnsupportedRange(other.to_string())),
        }
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query window derived from a token at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSpec {
    pub token: RangeToken,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub bucket_width: BucketWidth,
}

impl RangeSpec {
    pub fn start_epoch(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_epoch(&self) -> i64 {
        self.end.timestamp()
    }
}

/// Resolve a token against the current instant, captured once
pub fn resolve(token: &str) -> Result<RangeSpec> {
    resolve_at(token, now_in_display_tz())
}

pub fn resolve_at(token: &str, now: DateTime<Tz>) -> Result<RangeSpec> {
    let token: RangeToken = token.parse()?;
    let spec = RangeSpec {
        token,
        start: now - token.lookback(),
        end: now,
        bucket_width: token.bucket_width(),
    };

    debug!(
        "Resolved range {}: start={}, end={}, bucket={}",
        token, spec.start, spec.end, spec.bucket_width
    );

    Ok(spec)
}
