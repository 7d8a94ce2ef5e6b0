/// Market session and timing utilities (NYSE regular hours)
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Weekday};
use chrono_tz::Tz;

use crate::time::DISPLAY_TZ;

// Market open: 9:30 AM ET, close: 4:00 PM ET
const OPEN_HOUR: u32 = 9;
const OPEN_MINUTE: u32 = 30;
const CLOSE_HOUR: u32 = 16;

/// Check if the day is a trading day (weekdays only, holidays are not tracked)
pub fn is_trading_day(now: &DateTime<Tz>) -> bool {
    !matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Get market open and close for a calendar date
pub fn market_timings(date: NaiveDate) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let open = DISPLAY_TZ
        .from_local_datetime(&date.and_hms_opt(OPEN_HOUR, OPEN_MINUTE, 0)?)
        .single()?;
    let close = DISPLAY_TZ
        .from_local_datetime(&date.and_hms_opt(CLOSE_HOUR, 0, 0)?)
        .single()?;
    Some((open, close))
}

/// Check if market is open
pub fn is_market_open(now: &DateTime<Tz>) -> bool {
    let now = now.with_timezone(&DISPLAY_TZ);
    if !is_trading_day(&now) {
        return false;
    }

    let minute_of_day = now.hour() * 60 + now.minute();
    minute_of_day >= OPEN_HOUR * 60 + OPEN_MINUTE && minute_of_day < CLOSE_HOUR * 60
}

/// Get next market open time strictly after `now`
pub fn next_market_open(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let now = now.with_timezone(&DISPLAY_TZ);
    let mut date = now.date_naive();

    // A weekend plus one day always contains the next weekday open
    for _ in 0..8 {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            if let Some((open, _)) = market_timings(date) {
                if open > now {
                    return Some(open);
                }
            }
        }
        date = date.succ_opt()?;
    }

    None
}
