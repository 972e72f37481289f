//! Next-occurrence computation for every schedule kind.
//!
//! Cron expressions use the `cron` crate. Standard five-field expressions
//! (`min hour dom month dow`) are accepted by prefixing a zero seconds field.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use cron::Schedule;

use crate::error::JobError;
use crate::job::ScheduleSpec;

/// Parses a 5, 6 or 7 field cron expression.
pub fn parse_cron(expression: &str) -> Result<Schedule, JobError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(JobError::InvalidSchedule(
            "cron expression is empty".to_string(),
        ));
    }

    let normalized = match trimmed.split_whitespace().count() {
        5 => format!("0 {}", trimmed),
        _ => trimmed.to_string(),
    };

    Schedule::from_str(&normalized)
        .map_err(|e| JobError::InvalidSchedule(format!("'{}': {}", expression, e)))
}

/// Rejects specs that can never fire.
pub fn validate(spec: &ScheduleSpec) -> Result<(), JobError> {
    match spec {
        ScheduleSpec::Interval { minutes } if *minutes == 0 => Err(JobError::InvalidSchedule(
            "interval must be at least 1 minute".to_string(),
        )),
        ScheduleSpec::Cron { expression } => parse_cron(expression).map(|_| ()),
        _ => Ok(()),
    }
}

/// First occurrence strictly after `after`. `None` when a cron expression
/// has no future occurrence or does not parse.
pub fn next_after(spec: &ScheduleSpec, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match spec {
        ScheduleSpec::Interval { minutes } => Some(after + Duration::minutes(i64::from(*minutes))),
        ScheduleSpec::Daily { time } => {
            let candidate = at_time(after.date_naive(), *time);
            if candidate > after {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(1))
            }
        }
        ScheduleSpec::Weekly { weekday, time } => {
            let days_ahead = (7 + weekday.num_days_from_monday()
                - after.weekday().num_days_from_monday())
                % 7;
            let candidate = at_time(after.date_naive(), *time) + Duration::days(days_ahead.into());
            if candidate > after {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(7))
            }
        }
        ScheduleSpec::Cron { expression } => cron_next_after(expression, after).ok().flatten(),
    }
}

/// Next cron fire time strictly after `after`.
pub fn cron_next_after(
    expression: &str,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, JobError> {
    Ok(parse_cron(expression)?.after(&after).next())
}

fn at_time(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}
