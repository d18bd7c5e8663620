//! China futures exchange session/trading-day helper.
//!
//! Informational only: used by the ingest pipeline's timestamp validation
//! and available to callers that need to reason about trading-day
//! boundaries. Day session 09:00-15:00; night session 21:00-next day 02:30.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

const NIGHT_SESSION_START_HOUR: u32 = 21;

/// Whether `ts` belongs to the night session (21:00 onward, or before 02:30).
pub fn is_night_session(ts: DateTime<Utc>) -> bool {
    let t = ts.time();
    t >= NaiveTime::from_hms_opt(NIGHT_SESSION_START_HOUR, 0, 0).unwrap()
        || t < NaiveTime::from_hms_opt(2, 30, 0).unwrap()
}

/// Trading-day rule: a timestamp at or after 21:00 belongs to the next
/// calendar date's trading day.
pub fn trading_day(ts: DateTime<Utc>) -> chrono::NaiveDate {
    if ts.hour() >= NIGHT_SESSION_START_HOUR {
        (ts + Duration::days(1)).date_naive()
    } else {
        ts.date_naive()
    }
}

/// Accepts timestamps in `[now - 3600s, now + 60s]`.
pub fn is_timestamp_in_window(ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let delta = now - ts;
    delta <= Duration::seconds(3600) && delta >= Duration::seconds(-60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn night_session_rolls_to_next_day() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap();
        assert_eq!(trading_day(ts), chrono::NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    }

    #[test]
    fn day_session_keeps_same_day() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(trading_day(ts), chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn window_accepts_recent_past_and_near_future() {
        let now = Utc::now();
        assert!(is_timestamp_in_window(now - Duration::seconds(3000), now));
        assert!(is_timestamp_in_window(now + Duration::seconds(30), now));
        assert!(!is_timestamp_in_window(now - Duration::seconds(3700), now));
        assert!(!is_timestamp_in_window(now + Duration::seconds(120), now));
    }
}
