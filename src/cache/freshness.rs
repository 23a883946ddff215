//! Cache freshness policy
//!
//! Durations are written as `<integer><unit>` (e.g. `7d`, `90m`, `1M`) and
//! parsed once at startup. Calendar units are measured from the Unix epoch, so
//! `1M` is 31 days and `1y` is 365 days.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use thiserror::Error;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;
const SECS_PER_WEEK: u64 = 7 * SECS_PER_DAY;

/// Errors from parsing a duration string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    /// The string is not `<integer><unit>`
    #[error("invalid duration '{0}': expected <integer><unit>, e.g. 7d or 12h")]
    Malformed(String),

    /// The unit is not recognized
    #[error("invalid duration '{input}': unknown unit '{unit}'")]
    UnknownUnit { input: String, unit: String },

    /// The duration does not fit in the supported range
    #[error("invalid duration '{0}': value too large")]
    Overflow(String),
}

/// Units accepted in duration strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Quarters,
    Years,
}

impl Unit {
    /// Short forms are case-sensitive because `m` (minutes) and `M` (months)
    /// collide; long forms are not.
    fn parse(unit: &str) -> Option<Self> {
        match unit {
            "ms" => return Some(Unit::Millis),
            "s" => return Some(Unit::Seconds),
            "m" => return Some(Unit::Minutes),
            "h" => return Some(Unit::Hours),
            "d" => return Some(Unit::Days),
            "w" => return Some(Unit::Weeks),
            "M" => return Some(Unit::Months),
            "Q" => return Some(Unit::Quarters),
            "y" => return Some(Unit::Years),
            _ => {}
        }

        match unit.to_ascii_lowercase().as_str() {
            "millisecond" | "milliseconds" => Some(Unit::Millis),
            "second" | "seconds" => Some(Unit::Seconds),
            "minute" | "minutes" => Some(Unit::Minutes),
            "hour" | "hours" => Some(Unit::Hours),
            "day" | "days" => Some(Unit::Days),
            "week" | "weeks" => Some(Unit::Weeks),
            "month" | "months" => Some(Unit::Months),
            "quarter" | "quarters" => Some(Unit::Quarters),
            "year" | "years" => Some(Unit::Years),
            _ => None,
        }
    }
}

/// Parses a duration string such as `7d` or `30s`
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| DurationError::Malformed(input.to_string()))?;
    let (digits, unit_str) = trimmed.split_at(split);

    if digits.is_empty() || !unit_str.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DurationError::Malformed(input.to_string()));
    }

    let amount: u64 = digits
        .parse()
        .map_err(|_| DurationError::Overflow(input.to_string()))?;
    let unit = Unit::parse(unit_str).ok_or_else(|| DurationError::UnknownUnit {
        input: input.to_string(),
        unit: unit_str.to_string(),
    })?;
    let overflow = || DurationError::Overflow(input.to_string());

    let fixed = |per: u64| amount.checked_mul(per).map(Duration::from_secs);
    let duration = match unit {
        Unit::Millis => Some(Duration::from_millis(amount)),
        Unit::Seconds => Some(Duration::from_secs(amount)),
        Unit::Minutes => fixed(SECS_PER_MINUTE),
        Unit::Hours => fixed(SECS_PER_HOUR),
        Unit::Days => fixed(SECS_PER_DAY),
        Unit::Weeks => fixed(SECS_PER_WEEK),
        Unit::Months => calendar_months(amount),
        Unit::Quarters => amount.checked_mul(3).and_then(calendar_months),
        Unit::Years => amount.checked_mul(12).and_then(calendar_months),
    };

    duration.ok_or_else(overflow)
}

/// Length of `months` calendar months counted from the Unix epoch
fn calendar_months(months: u64) -> Option<Duration> {
    let months = u32::try_from(months).ok()?;
    let epoch = DateTime::<Utc>::from_timestamp(0, 0)?;
    let end = epoch.checked_add_months(Months::new(months))?;
    u64::try_from(end.timestamp()).ok().map(Duration::from_secs)
}

/// How long a cache entry stays fresh, in whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl(i64);

impl Ttl {
    /// Creates a TTL from a number of seconds
    pub fn from_secs(seconds: i64) -> Self {
        Self(seconds)
    }

    /// The TTL in seconds
    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Whether an entry fetched at `fetched_at` is still usable at `now`
    pub fn is_fresh(&self, fetched_at: Option<i64>, now: i64) -> bool {
        is_fresh(fetched_at, now, self.0)
    }
}

impl FromStr for Ttl {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let duration = parse_duration(s)?;
        let seconds =
            i64::try_from(duration.as_secs()).map_err(|_| DurationError::Overflow(s.to_string()))?;
        Ok(Self(seconds))
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Returns true iff `now - fetched_at < ttl_seconds`
///
/// An absent timestamp is never fresh.
pub fn is_fresh(fetched_at: Option<i64>, now: i64, ttl_seconds: i64) -> bool {
    match fetched_at {
        Some(fetched_at) => now.saturating_sub(fetched_at) < ttl_seconds,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_long_unit_names() {
        assert_eq!(parse_duration("3days").unwrap(), Duration::from_secs(259_200));
        assert_eq!(parse_duration("1Hour").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("10minutes").unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn test_parse_calendar_units_from_epoch() {
        // January 1970 has 31 days
        assert_eq!(parse_duration("1M").unwrap(), Duration::from_secs(31 * SECS_PER_DAY));
        // 1970 is not a leap year
        assert_eq!(parse_duration("1y").unwrap(), Duration::from_secs(365 * SECS_PER_DAY));
        // Jan + Feb + Mar 1970
        assert_eq!(parse_duration("1Q").unwrap(), Duration::from_secs(90 * SECS_PER_DAY));
    }

    #[test]
    fn test_minutes_and_months_are_distinct() {
        assert_ne!(parse_duration("1m").unwrap(), parse_duration("1M").unwrap());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(parse_duration(""), Err(DurationError::Malformed(_))));
        assert!(matches!(parse_duration("7"), Err(DurationError::Malformed(_))));
        assert!(matches!(parse_duration("d"), Err(DurationError::Malformed(_))));
        assert!(matches!(parse_duration("-7d"), Err(DurationError::Malformed(_))));
        assert!(matches!(parse_duration("7d12h"), Err(DurationError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_unit() {
        let err = parse_duration("7fortnights").unwrap_err();
        assert!(matches!(err, DurationError::UnknownUnit { .. }));
        assert!(err.to_string().contains("fortnights"));
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(matches!(
            parse_duration("99999999999999999999999d"),
            Err(DurationError::Overflow(_))
        ));
        assert!(matches!(
            parse_duration("18446744073709551615w"),
            Err(DurationError::Overflow(_))
        ));
    }

    #[test]
    fn test_ttl_truncates_to_seconds() {
        let ttl: Ttl = "1999ms".parse().unwrap();
        assert_eq!(ttl.as_secs(), 1);
    }

    #[test]
    fn test_is_fresh_boundary_is_exclusive() {
        assert!(is_fresh(Some(0), 0, 60));
        assert!(is_fresh(Some(0), 59, 60));
        assert!(!is_fresh(Some(0), 60, 60));
        assert!(!is_fresh(Some(0), 61, 60));
    }

    #[test]
    fn test_absent_entry_is_never_fresh() {
        assert!(!is_fresh(None, 0, 60));
        assert!(!is_fresh(None, 0, i64::MAX));
    }

    #[test]
    fn test_zero_ttl_is_never_fresh() {
        let ttl = Ttl::from_secs(0);
        assert!(!ttl.is_fresh(Some(100), 100));
    }
}
