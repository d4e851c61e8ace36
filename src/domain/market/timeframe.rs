use anyhow::{Result, anyhow};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents the candle bucket widths supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    SeventyFiveMin,
    OneDay,
    OneWeek,
}

/// Named download window accepted by the market-data vendor.
///
/// Sub-hour timeframes are capped at 60 days by the vendor, hourly at
/// roughly two years; daily and weekly history is unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPeriod {
    Days(u32),
    TwoYears,
    FiveYears,
    Max,
}

impl FetchPeriod {
    /// Vendor query-string representation of this window
    pub fn vendor_range(&self) -> String {
        match self {
            FetchPeriod::Days(n) => format!("{}d", n),
            FetchPeriod::TwoYears => "730d".to_string(),
            FetchPeriod::FiveYears => "5y".to_string(),
            FetchPeriod::Max => "max".to_string(),
        }
    }

    /// Approximate length in days, used to clamp requests per timeframe
    fn approx_days(&self) -> u32 {
        match self {
            FetchPeriod::Days(n) => *n,
            FetchPeriod::TwoYears => 730,
            FetchPeriod::FiveYears => 1826,
            FetchPeriod::Max => u32::MAX,
        }
    }
}

impl fmt::Display for FetchPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.vendor_range())
    }
}

impl Timeframe {
    /// Returns the duration of this timeframe in minutes
    pub fn to_minutes(&self) -> usize {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::ThirtyMin => 30,
            Timeframe::OneHour => 60,
            Timeframe::SeventyFiveMin => 75,
            Timeframe::OneDay => 1440,
            Timeframe::OneWeek => 10080,
        }
    }

    /// Canonical storage string, also used as the database enum value
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::SeventyFiveMin => "75m",
            Timeframe::OneDay => "1d",
            Timeframe::OneWeek => "1w",
        }
    }

    /// Vendor interval string. `None` for 75m: the vendor has no such
    /// interval, those candles are derived from stored 15m data.
    pub fn vendor_interval(&self) -> Option<&'static str> {
        match self {
            Timeframe::SeventyFiveMin => None,
            Timeframe::OneWeek => Some("1wk"),
            other => Some(other.as_str()),
        }
    }

    /// Returns all supported timeframes in ascending bucket order
    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::OneMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::SeventyFiveMin,
            Timeframe::OneDay,
            Timeframe::OneWeek,
        ]
    }

    /// Widest window the vendor will serve for this timeframe
    pub fn max_fetch_period(&self) -> FetchPeriod {
        match self {
            Timeframe::OneMin => FetchPeriod::Days(7),
            Timeframe::FiveMin | Timeframe::FifteenMin | Timeframe::ThirtyMin => {
                FetchPeriod::Days(60)
            }
            // 75m is resampled from 15m, so it inherits the 15m cap
            Timeframe::SeventyFiveMin => FetchPeriod::Days(60),
            Timeframe::OneHour => FetchPeriod::TwoYears,
            Timeframe::OneDay | Timeframe::OneWeek => FetchPeriod::Max,
        }
    }

    /// Clamps a requested window to what the vendor allows for this timeframe
    pub fn clamp_period(&self, requested: FetchPeriod) -> FetchPeriod {
        let cap = self.max_fetch_period();
        if requested.approx_days() > cap.approx_days() {
            cap
        } else {
            requested
        }
    }

    /// Age beyond which stored data for this timeframe counts as stale
    pub fn staleness_threshold(&self) -> Duration {
        match self {
            Timeframe::OneMin => Duration::hours(1),
            Timeframe::FiveMin => Duration::hours(2),
            Timeframe::FifteenMin => Duration::hours(4),
            Timeframe::ThirtyMin => Duration::hours(6),
            Timeframe::OneHour => Duration::days(1),
            Timeframe::SeventyFiveMin => Duration::days(1),
            Timeframe::OneDay => Duration::days(1),
            Timeframe::OneWeek => Duration::days(7),
        }
    }

    /// Default number of candles loaded for signal analysis
    pub fn default_lookback(&self) -> usize {
        match self {
            Timeframe::SeventyFiveMin => 150,
            _ => 365,
        }
    }

    /// Minimum number of candles the scoring strategy needs on this timeframe
    pub fn min_candles(&self) -> usize {
        match self {
            Timeframe::SeventyFiveMin => 100,
            _ => 50,
        }
    }

    /// True for bucket widths below one trading day
    pub fn is_intraday(&self) -> bool {
        self.to_minutes() < 1440
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::OneMin),
            "5m" | "5min" => Ok(Timeframe::FiveMin),
            "15m" | "15min" => Ok(Timeframe::FifteenMin),
            "30m" | "30min" => Ok(Timeframe::ThirtyMin),
            "1h" | "60m" | "1hour" => Ok(Timeframe::OneHour),
            "75m" | "75min" => Ok(Timeframe::SeventyFiveMin),
            "1d" | "1day" => Ok(Timeframe::OneDay),
            "1w" | "1wk" | "1week" => Ok(Timeframe::OneWeek),
            _ => Err(anyhow!(
                "Invalid timeframe: '{}'. Valid options: 1m, 5m, 15m, 30m, 1h, 75m, 1d, 1w",
                s
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_minutes() {
        assert_eq!(Timeframe::OneMin.to_minutes(), 1);
        assert_eq!(Timeframe::FifteenMin.to_minutes(), 15);
        assert_eq!(Timeframe::SeventyFiveMin.to_minutes(), 75);
        assert_eq!(Timeframe::OneDay.to_minutes(), 1440);
        assert_eq!(Timeframe::OneWeek.to_minutes(), 10080);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(Timeframe::from_str("1m").unwrap(), Timeframe::OneMin);
        assert_eq!(Timeframe::from_str("75M").unwrap(), Timeframe::SeventyFiveMin);
        assert_eq!(Timeframe::from_str("1d").unwrap(), Timeframe::OneDay);
        assert_eq!(Timeframe::from_str("1w").unwrap(), Timeframe::OneWeek);
        assert!(Timeframe::from_str("4h").is_err());
    }

    #[test]
    fn test_vendor_interval() {
        assert_eq!(Timeframe::OneDay.vendor_interval(), Some("1d"));
        assert_eq!(Timeframe::OneWeek.vendor_interval(), Some("1wk"));
        assert_eq!(Timeframe::SeventyFiveMin.vendor_interval(), None);
    }

    #[test]
    fn test_period_clamping() {
        // Sub-hour data is capped at 60 days
        assert_eq!(
            Timeframe::FifteenMin.clamp_period(FetchPeriod::FiveYears),
            FetchPeriod::Days(60)
        );
        // Hourly at two years
        assert_eq!(
            Timeframe::OneHour.clamp_period(FetchPeriod::Max),
            FetchPeriod::TwoYears
        );
        // Daily is unrestricted
        assert_eq!(
            Timeframe::OneDay.clamp_period(FetchPeriod::Max),
            FetchPeriod::Max
        );
        // Requests inside the cap pass through
        assert_eq!(
            Timeframe::FiveMin.clamp_period(FetchPeriod::Days(7)),
            FetchPeriod::Days(7)
        );
    }

    #[test]
    fn test_staleness_thresholds() {
        assert_eq!(Timeframe::OneMin.staleness_threshold(), Duration::hours(1));
        assert_eq!(Timeframe::OneDay.staleness_threshold(), Duration::days(1));
        assert_eq!(Timeframe::OneWeek.staleness_threshold(), Duration::days(7));
    }

    #[test]
    fn test_default_lookback() {
        assert_eq!(Timeframe::OneDay.default_lookback(), 365);
        assert_eq!(Timeframe::SeventyFiveMin.default_lookback(), 150);
    }
}
