/// Fixed-width time buckets and the floor primitive shared by the write and read paths
use std::fmt;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use crate::error::{PipelineError, Result};

/// Positive bucket width in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketWidth(i64);

impl BucketWidth {
    pub const MINUTE: BucketWidth = BucketWidth(60);
    pub const HALF_HOUR: BucketWidth = BucketWidth(30 * 60);
    pub const HOUR: BucketWidth = BucketWidth(60 * 60);

    pub fn from_seconds(seconds: i64) -> Result<Self> {
        if seconds <= 0 {
            return Err(PipelineError::InvalidParameter(format!(
                "bucket width must be positive, got {}",
                seconds
            )));
        }
        Ok(BucketWidth(seconds))
    }

    pub fn seconds(&self) -> i64 {
        self.0
    }

    /// Start of the half-open bucket `[start, start + width)` containing `epoch_seconds`
    pub fn floor(&self, epoch_seconds: i64) -> i64 {
        epoch_seconds - epoch_seconds.rem_euclid(self.0)
    }

    /// True when every bucket of `coarser` is a union of whole buckets of `self`
    pub fn nests_in(&self, coarser: BucketWidth) -> bool {
        coarser.0 % self.0 == 0
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Floor a zoned instant to its bucket start, keeping the zone
pub fn floor_instant(ts: &DateTime<Tz>, width: BucketWidth) -> DateTime<Tz> {
    let excess = ts.timestamp().rem_euclid(width.seconds());
    *ts - Duration::seconds(excess) - Duration::nanoseconds(ts.timestamp_subsec_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::DISPLAY_TZ;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_floor_epoch() {
        assert_eq!(BucketWidth::MINUTE.floor(125), 120);
        assert_eq!(BucketWidth::MINUTE.floor(120), 120);
        assert_eq!(BucketWidth::HALF_HOUR.floor(1_800 + 1_799), 1_800);
        // Euclidean: pre-epoch instants still floor downward
        assert_eq!(BucketWidth::MINUTE.floor(-1), -60);
    }

    #[test]
    fn test_rejects_non_positive_width() {
        assert!(BucketWidth::from_seconds(0).is_err());
        assert!(BucketWidth::from_seconds(-60).is_err());
        assert_eq!(BucketWidth::from_seconds(300).unwrap().seconds(), 300);
    }

    #[test]
    fn test_nesting() {
        assert!(BucketWidth::MINUTE.nests_in(BucketWidth::HALF_HOUR));
        assert!(BucketWidth::HALF_HOUR.nests_in(BucketWidth::HOUR));
        assert!(!BucketWidth::HOUR.nests_in(BucketWidth::HALF_HOUR));
    }

    #[test]
    fn test_floor_instant_keeps_zone() {
        let ts = DISPLAY_TZ.with_ymd_and_hms(2025, 3, 14, 9, 47, 31).unwrap()
            + Duration::milliseconds(250);
        let floored = floor_instant(&ts, BucketWidth::HALF_HOUR);

        assert_eq!(floored.hour(), 9);
        assert_eq!(floored.minute(), 30);
        assert_eq!(floored.second(), 0);
        assert_eq!(floored.nanosecond(), 0);
        assert_eq!(floored.timezone(), DISPLAY_TZ);
    }
}
