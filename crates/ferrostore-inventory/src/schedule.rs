//! `NextRunAt` computation (§4.9): the next matching clock instant after a
//! reference time, for a `frequency` (`daily`/`weekly`) and `schedule_time`
//! (`HH:MM`, UTC).

use chrono::{NaiveTime, TimeZone, Utc};
use ferrostore_meta::models::InventoryFrequency;

use crate::error::{InventoryError, InventoryResult};

/// Parses `HH:MM` into a `NaiveTime`, rejecting anything else.
pub fn parse_schedule_time(schedule_time: &str) -> InventoryResult<NaiveTime> {
    NaiveTime::parse_from_str(schedule_time, "%H:%M")
        .map_err(|_| InventoryError::Common(ferrostore_common::Error::InvalidRequest(format!("invalid schedule_time: {schedule_time}"))))
}

/// The next instant, strictly after `after`, at which `schedule_time` falls
/// on a day matching `frequency`. Daily advances one day at a time; weekly
/// advances in 7-day steps from `after`'s date, so it always lands exactly a
/// week apart from the previous run regardless of calendar month boundaries.
#[must_use]
pub fn next_run_at(after: chrono::DateTime<Utc>, frequency: InventoryFrequency, time: NaiveTime) -> chrono::DateTime<Utc> {
    let step_days: i64 = match frequency {
        InventoryFrequency::Daily => 1,
        InventoryFrequency::Weekly => 7,
    };

    let mut candidate = Utc.from_utc_datetime(&after.date_naive().and_time(time));
    if candidate <= after {
        candidate += chrono::Duration::days(step_days);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_schedule_time_rejects_garbage() {
        assert!(parse_schedule_time("25:99").is_err());
        assert!(parse_schedule_time("not-a-time").is_err());
        assert_eq!(parse_schedule_time("03:30").unwrap(), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
    }

    #[test]
    fn test_daily_schedule_rolls_to_tomorrow_once_passed() {
        let time = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let after = Utc.from_utc_datetime(&chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(12, 0, 0).unwrap());
        let next = next_run_at(after, InventoryFrequency::Daily, time);
        assert_eq!(next.date_naive(), chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap());
    }

    #[test]
    fn test_daily_schedule_same_day_if_still_ahead() {
        let time = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        let after = Utc.from_utc_datetime(&chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(1, 0, 0).unwrap());
        let next = next_run_at(after, InventoryFrequency::Daily, time);
        assert_eq!(next.date_naive(), chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap());
    }

    #[test]
    fn test_weekly_schedule_advances_seven_days() {
        let time = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let after = Utc.from_utc_datetime(&chrono::NaiveDate::from_ymd_opt(2026, 7, 27).unwrap().and_hms_opt(12, 0, 0).unwrap());
        let next = next_run_at(after, InventoryFrequency::Weekly, time);
        assert_eq!(next.date_naive() - after.date_naive(), Duration::days(7));
    }
}
