//! NSE market-session clock.
//!
//! Staleness decisions compare against the last moment the market could
//! have produced data, not wall-clock now: on weekends and before the
//! Monday open the reference point is the prior Friday close.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};

/// Asia/Kolkata is UTC+05:30 year-round
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("constant offset")
}

/// Session opens 09:15 IST
pub fn session_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).expect("constant time")
}

/// Session closes 15:30 IST
pub fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).expect("constant time")
}

/// Effective reference instant for staleness checks.
///
/// Saturday, Sunday and Monday-before-open all resolve to the prior Friday
/// 15:30 IST; any other moment passes through unchanged.
pub fn market_reference(now: DateTime<Utc>) -> DateTime<Utc> {
    let ist = now.with_timezone(&ist_offset());
    let days_back = match ist.weekday() {
        Weekday::Sat => Some(1),
        Weekday::Sun => Some(2),
        Weekday::Mon if ist.time() < session_open() => Some(3),
        _ => None,
    };

    match days_back {
        None => now,
        Some(days) => {
            let friday = ist.date_naive() - Duration::days(days);
            ist_offset()
                .from_local_datetime(&friday.and_time(session_close()))
                .single()
                .expect("fixed offset is unambiguous")
                .with_timezone(&Utc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        ist_offset()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_weekday_passes_through() {
        // Friday 2025-11-07 14:00 IST
        let now = ist(2025, 11, 7, 14, 0);
        assert_eq!(market_reference(now), now);
    }

    #[test]
    fn test_saturday_maps_to_friday_close() {
        let now = ist(2025, 11, 8, 11, 0);
        assert_eq!(market_reference(now), ist(2025, 11, 7, 15, 30));
    }

    #[test]
    fn test_sunday_maps_to_friday_close() {
        let now = ist(2025, 11, 9, 20, 0);
        assert_eq!(market_reference(now), ist(2025, 11, 7, 15, 30));
    }

    #[test]
    fn test_monday_premarket_maps_to_friday_close() {
        // Monday 2025-11-10 07:00 IST, before the 09:15 open
        let now = ist(2025, 11, 10, 7, 0);
        assert_eq!(market_reference(now), ist(2025, 11, 7, 15, 30));
    }

    #[test]
    fn test_monday_after_open_passes_through() {
        let now = ist(2025, 11, 10, 9, 30);
        assert_eq!(market_reference(now), now);
    }
}
