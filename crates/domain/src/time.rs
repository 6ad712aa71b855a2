//! Time and timestamp helpers.

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// UTC timestamp used for log-facing records such as pending trigger queue times.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Local wall-clock reading at minute precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockReading {
    /// Calendar day as `MM-DD`.
    pub month_day: String,
    pub time: NaiveTime,
}

impl Default for ClockReading {
    fn default() -> Self {
        Self {
            month_day: "01-01".to_string(),
            time: NaiveTime::MIN,
        }
    }
}

impl ClockReading {
    /// Read the local clock.
    #[must_use]
    pub fn local_now() -> Self {
        Self::at(Local::now().naive_local())
    }

    #[must_use]
    pub fn at(datetime: NaiveDateTime) -> Self {
        let time = datetime.time();
        Self {
            month_day: datetime.format("%m-%d").to_string(),
            time: time
                .with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(time),
        }
    }
}

/// Parse a `HH:MM` string.
#[must_use]
pub fn parse_hh_mm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Check `time` against an inclusive `HH:MM-HH:MM` window.
///
/// A window whose end is before its start spans midnight. Malformed windows
/// never match.
#[must_use]
pub fn in_time_range(range: &str, time: NaiveTime) -> bool {
    let Some((start, end)) = range.split_once('-') else {
        return false;
    };
    let (Some(start), Some(end)) = (parse_hh_mm(start), parse_hh_mm(end)) else {
        return false;
    };
    if start <= end {
        start <= time && time <= end
    } else {
        time >= start || time <= end
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_truncate_clock_reading_to_minutes() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 41, 59)
            .unwrap();
        let reading = ClockReading::at(dt);
        assert_eq!(reading.month_day, "03-07");
        assert_eq!(reading.time, hm(9, 41));
    }

    #[test]
    fn should_include_both_ends_of_time_range() {
        assert!(in_time_range("08:00-22:00", hm(8, 0)));
        assert!(in_time_range("08:00-22:00", hm(22, 0)));
        assert!(!in_time_range("08:00-22:00", hm(22, 1)));
    }

    #[test]
    fn should_wrap_midnight_when_end_precedes_start() {
        assert!(in_time_range("23:00-01:00", hm(23, 30)));
        assert!(in_time_range("23:00-01:00", hm(0, 30)));
        assert!(!in_time_range("23:00-01:00", hm(12, 0)));
    }

    #[test]
    fn should_reject_malformed_time_range() {
        assert!(!in_time_range("morning", hm(8, 0)));
        assert!(!in_time_range("8am-9am", hm(8, 30)));
    }
}
