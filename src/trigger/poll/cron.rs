//! Cron trigger scheduling (spec.md §4.8 "cron interval value×unit" /
//! "cron schedule computes the next scheduled wall-clock instant",
//! §8 property 9). All wall-clock math is UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};

use crate::model::trigger::{CronFrequency, CronTriggerConfig, CronUnit};

fn unit_duration(value: u32, unit: CronUnit) -> Duration {
    match unit {
        CronUnit::Minutes => Duration::minutes(value as i64),
        CronUnit::Hours => Duration::hours(value as i64),
        CronUnit::Days => Duration::days(value as i64),
    }
}

/// The next scheduled wall-clock instant strictly after `after`.
pub fn next_occurrence(cfg: &CronTriggerConfig, after: DateTime<Utc>) -> DateTime<Utc> {
    match cfg {
        CronTriggerConfig::Interval { value, unit } => after + unit_duration(*value, *unit),
        CronTriggerConfig::Schedule {
            frequency,
            time_of_day,
            day_of_week,
            day_of_month,
        } => match frequency {
            CronFrequency::Daily => next_daily(after, *time_of_day),
            CronFrequency::Weekly => {
                next_weekly(after, *time_of_day, day_of_week.unwrap_or(Weekday::Mon))
            }
            CronFrequency::Monthly => {
                next_monthly(after, *time_of_day, day_of_month.unwrap_or(1))
            }
        },
    }
}

/// A trigger is due when it has never been polled, or the current
/// instant is strictly past the next scheduled occurrence after the
/// last poll (spec.md §4.8).
pub fn is_due(cfg: &CronTriggerConfig, last_polled: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_polled {
        None => true,
        Some(lp) => now > next_occurrence(cfg, lp),
    }
}

fn next_daily(after: DateTime<Utc>, time_of_day: chrono::NaiveTime) -> DateTime<Utc> {
    let candidate = Utc.from_utc_datetime(&after.date_naive().and_time(time_of_day));
    if candidate > after {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

fn next_weekly(after: DateTime<Utc>, time_of_day: chrono::NaiveTime, target: Weekday) -> DateTime<Utc> {
    for offset in 0..8 {
        let date = after.date_naive() + Duration::days(offset);
        if date.weekday() == target {
            let candidate = Utc.from_utc_datetime(&date.and_time(time_of_day));
            if candidate > after {
                return candidate;
            }
        }
    }
    unreachable!("a matching weekday occurs within 8 days")
}

fn next_monthly(after: DateTime<Utc>, time_of_day: chrono::NaiveTime, day_of_month: u32) -> DateTime<Utc> {
    let mut year = after.year();
    let mut month = after.month();
    for _ in 0..24 {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day_of_month) {
            let candidate = Utc.from_utc_datetime(&date.and_time(time_of_day));
            if candidate > after {
                return candidate;
            }
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    unreachable!("a matching day-of-month occurs within 24 months")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn daily(time: &str) -> CronTriggerConfig {
        CronTriggerConfig::Schedule {
            frequency: CronFrequency::Daily,
            time_of_day: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            day_of_week: None,
            day_of_month: None,
        }
    }

    #[test]
    fn daily_due_when_never_polled() {
        let cfg = daily("10:00");
        assert!(is_due(&cfg, None, dt("2025-06-15T09:00:00Z")));
        assert!(is_due(&cfg, None, dt("2025-06-15T11:00:00Z")));
    }

    #[test]
    fn daily_next_poll_after_polling_is_tomorrow() {
        let cfg = daily("10:00");
        let last_polled = dt("2025-06-15T10:05:00Z");
        let next = next_occurrence(&cfg, last_polled);
        assert!(next >= dt("2025-06-16T10:00:00Z"));
    }

    #[test]
    fn weekly_next_occurrence() {
        let cfg = CronTriggerConfig::Schedule {
            frequency: CronFrequency::Weekly,
            time_of_day: NaiveTime::parse_from_str("08:00", "%H:%M").unwrap(),
            day_of_week: Some(Weekday::Wed),
            day_of_month: None,
        };
        let now = dt("2025-06-15T09:00:00Z"); // Sunday
        let next = next_occurrence(&cfg, now);
        assert_eq!(next, dt("2025-06-18T08:00:00Z"));
    }

    #[test]
    fn monthly_next_occurrence() {
        let cfg = CronTriggerConfig::Schedule {
            frequency: CronFrequency::Monthly,
            time_of_day: NaiveTime::parse_from_str("12:00", "%H:%M").unwrap(),
            day_of_week: None,
            day_of_month: Some(15),
        };
        let now = dt("2025-06-10T09:00:00Z");
        let next = next_occurrence(&cfg, now);
        assert_eq!(next, dt("2025-06-15T12:00:00Z"));
    }

    #[test]
    fn interval_next_occurrence_adds_unit_duration() {
        let cfg = CronTriggerConfig::Interval {
            value: 15,
            unit: CronUnit::Minutes,
        };
        let now = dt("2025-06-15T09:00:00Z");
        assert_eq!(next_occurrence(&cfg, now), dt("2025-06-15T09:15:00Z"));
    }
}
