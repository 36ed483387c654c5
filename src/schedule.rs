use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

/// Mondays 08:00 UTC, October through April.
pub const DEFAULT_SCHEDULE: &str = "0 8 * 10-12,1-4 1";

const MAX_STEPS: usize = 100_000;

/// Five-field cron expression: minute, hour, day-of-month, month, day-of-week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
    days_restricted: bool,
    weekdays_restricted: bool,
}

fn parse_number(raw: &str, field: &str) -> Result<u32> {
    raw.parse::<u32>()
        .with_context(|| format!("invalid number {raw:?} in {field} field"))
}

fn parse_field(raw: &str, field: &str, min: u32, max: u32) -> Result<u64> {
    let mut mask = 0u64;
    for part in raw.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(parse_number(step, field)?)),
            None => (part, None),
        };
        if step == Some(0) {
            bail!("step of zero in {field} field");
        }
        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_number(a, field)?, parse_number(b, field)?)
        } else {
            let v = parse_number(range, field)?;
            if step.is_some() { (v, max) } else { (v, v) }
        };
        if lo < min || hi > max || lo > hi {
            bail!("{part:?} out of range {min}-{max} in {field} field");
        }
        let step = step.unwrap_or(1) as usize;
        for v in (lo..=hi).step_by(step) {
            mask |= 1 << v;
        }
    }
    Ok(mask)
}

fn has(mask: u64, v: u32) -> bool {
    mask & (1 << v) != 0
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let fields = expression.split_whitespace().collect::<Vec<_>>();
        let &[minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(anyhow!(
                "cron expression needs 5 fields, got {}: {expression:?}",
                fields.len()
            ));
        };
        let mut weekdays = parse_field(weekday, "day-of-week", 0, 7)?;
        if has(weekdays, 7) {
            weekdays = (weekdays & !(1 << 7)) | 1;
        }
        Ok(Self {
            expression: fields.join(" "),
            minutes: parse_field(minute, "minute", 0, 59)?,
            hours: parse_field(hour, "hour", 0, 23)?,
            days: parse_field(day, "day-of-month", 1, 31)?,
            months: parse_field(month, "month", 1, 12)?,
            weekdays,
            days_restricted: !day.starts_with('*'),
            weekdays_restricted: !weekday.starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let dom = has(self.days, t.day());
        let dow = has(self.weekdays, t.weekday().num_days_from_sunday());
        if self.days_restricted && self.weekdays_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        has(self.minutes, t.minute())
            && has(self.hours, t.hour())
            && has(self.months, t.month())
            && self.day_matches(&t)
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let mut t = start;
        for _ in 0..MAX_STEPS {
            if !has(self.months, t.month()) {
                let (y, m) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0).single()?;
                continue;
            }
            if !self.day_matches(&t) {
                t = t.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc();
                continue;
            }
            if !has(self.hours, t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !has(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{CronSchedule, DEFAULT_SCHEDULE};
    use chrono::{TimeZone, Utc};

    #[test]
    fn default_schedule_is_monday_morning_in_season() {
        let cron = CronSchedule::parse(DEFAULT_SCHEDULE).expect("parse");
        assert_eq!(cron.expression(), DEFAULT_SCHEDULE);
        let monday_oct = Utc.with_ymd_and_hms(2024, 10, 7, 8, 0, 0).unwrap();
        let monday_jun = Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap();
        let tuesday_oct = Utc.with_ymd_and_hms(2024, 10, 8, 8, 0, 0).unwrap();
        assert!(cron.matches(monday_oct));
        assert!(!cron.matches(monday_jun));
        assert!(!cron.matches(tuesday_oct));
    }

    #[test]
    fn next_trigger_skips_offseason() {
        let cron = CronSchedule::parse(DEFAULT_SCHEDULE).expect("parse");
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            cron.next_after(after),
            Some(Utc.with_ymd_and_hms(2024, 10, 7, 8, 0, 0).unwrap())
        );
        let on_trigger = Utc.with_ymd_and_hms(2024, 10, 7, 8, 0, 0).unwrap();
        assert_eq!(
            cron.next_after(on_trigger),
            Some(Utc.with_ymd_and_hms(2024, 10, 14, 8, 0, 0).unwrap())
        );
        let new_year = Utc.with_ymd_and_hms(2024, 12, 31, 9, 0, 0).unwrap();
        assert_eq!(
            cron.next_after(new_year),
            Some(Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn restricted_day_fields_are_ored() {
        let cron = CronSchedule::parse("0 0 1 * 1").expect("parse");
        assert!(cron.matches(Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap()));
        assert!(cron.matches(Utc.with_ymd_and_hms(2024, 10, 7, 0, 0, 0).unwrap()));
        assert!(!cron.matches(Utc.with_ymd_and_hms(2024, 10, 8, 0, 0, 0).unwrap()));
    }

    #[test]
    fn steps_and_sunday_alias() {
        let cron = CronSchedule::parse("*/15 9-17/4 * * 7").expect("parse");
        let sunday = Utc.with_ymd_and_hms(2024, 10, 6, 13, 30, 0).unwrap();
        assert!(cron.matches(sunday));
        assert!(!cron.matches(Utc.with_ymd_and_hms(2024, 10, 6, 13, 31, 0).unwrap()));
        assert!(!cron.matches(Utc.with_ymd_and_hms(2024, 10, 6, 12, 30, 0).unwrap()));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(CronSchedule::parse("61 * * * *").is_err());
        assert!(CronSchedule::parse("* * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("5-2 * * * *").is_err());
    }
}
