//! Time-use statistics over stored snapshots.

mod aggregator;
mod classifier;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

pub use aggregator::{summarize, StatsAggregator};
pub use classifier::{ActivityCategory, AppClassifier};

/// `[midnight, next midnight)` of `day`, in UTC.
pub fn day_range(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// The `days` calendar days ending with the day of `as_of`, inclusive.
pub fn trailing_days(as_of: DateTime<Utc>, days: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let (_, end) = day_range(as_of.date_naive());
    (end - Duration::days(i64::from(days.max(1))), end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ranges_cover_whole_utc_days() {
        let as_of = Utc.with_ymd_and_hms(2026, 10, 18, 15, 30, 0).unwrap();
        let (start, end) = day_range(as_of.date_naive());
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap());

        let (week_start, week_end) = trailing_days(as_of, 7);
        assert_eq!(week_start, Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap());
        assert_eq!(week_end, end);
    }
}
