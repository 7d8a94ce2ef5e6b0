pub mod bucket;
pub mod range;
pub mod session;

pub use bucket::{floor_instant, BucketWidth};
pub use range::{resolve, resolve_at, RangeSpec, RangeToken};
pub use session::{is_market_open, is_trading_day, market_timings, next_market_open};

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The single zone every tick, bucket and rendered point lives in
pub const DISPLAY_TZ: Tz = chrono_tz::America::New_York;

pub fn now_in_display_tz() -> DateTime<Tz> {
    Utc::now().with_timezone(&DISPLAY_TZ)
}

/// Render epoch seconds in the display zone (None only for out-of-range epochs)
pub fn epoch_to_display(epoch_seconds: i64) -> Option<DateTime<Tz>> {
    DISPLAY_TZ.timestamp_opt(epoch_seconds, 0).single()
}

/// Floor an instant to the start of its minute
pub fn floor_to_minute(ts: &DateTime<Tz>) -> DateTime<Tz> {
    floor_instant(ts, BucketWidth::MINUTE)
}
