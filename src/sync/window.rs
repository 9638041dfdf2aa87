//! Fetch window arithmetic
//!
//! All boundaries are computed in the offset of the supplied `now`.

use crate::candle::format_api_timestamp;
use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveTime};

/// Last minute of the day the window closes on
const END_OF_DAY_MINUTES: i64 = 23 * 60 + 59;

/// Local midnight of `date` at `offset`; `None` outside chrono's range
pub fn start_of_day(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let local = date.and_time(NaiveTime::MIN);
    let utc = local.checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))?;
    Some(DateTime::from_naive_utc_and_offset(utc, offset))
}

/// 23:59:00 on the day of `now`
pub fn end_of_day(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let close = NaiveTime::MIN + Duration::minutes(END_OF_DAY_MINUTES);
    now + (close - now.time())
}

/// Midnight `days` days before the day of `now`; `None` when that date is
/// not representable
pub fn lookback_start(now: DateTime<FixedOffset>, days: u32) -> Option<DateTime<FixedOffset>> {
    let date = now
        .date_naive()
        .checked_sub_days(Days::new(u64::from(days)))?;
    start_of_day(date, *now.offset())
}

/// Request parameter form of a window boundary
pub fn api_timestamp(ts: &DateTime<FixedOffset>) -> String {
    format_api_timestamp(ts)
}
