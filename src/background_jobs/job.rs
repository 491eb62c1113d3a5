use crate::backup::DEFAULT_RETENTION_DAYS;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Errors that can occur when triggering a backup run.
#[derive(Debug)]
pub enum JobError {
    AlreadyRunning,
    ExecutionFailed(String),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::AlreadyRunning => write!(f, "A backup run is already in progress"),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{0}': {1}")]
    InvalidCron(String, &'static str),
    #[error("Invalid timezone '{0}', expected UTC, a zone name like Europe/Rome or an offset like +02:00")]
    InvalidTimezone(String),
}

/// Raw schedule configuration as read from CLI/TOML, re-read on restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub cron: String,
    pub timezone: String,
    pub retention_days: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            cron: "0 6 * * *".to_string(),
            timezone: "UTC".to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Where the daily time of day is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduleZone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl ScheduleZone {
    fn local_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match self {
            ScheduleZone::Fixed(offset) => now.with_timezone(offset).naive_local(),
            ScheduleZone::Named(tz) => now.with_timezone(tz).naive_local(),
        }
    }

    /// Maps a wall-clock time to an instant. Ambiguous times take the earlier
    /// instant; times skipped by a DST jump fire right after the gap.
    fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            ScheduleZone::Fixed(offset) => offset.from_local_datetime(&local).earliest(),
            ScheduleZone::Named(tz) => tz
                .from_local_datetime(&local)
                .earliest()
                .or_else(|| {
                    (1..=3).find_map(|hours| {
                        tz.from_local_datetime(&(local + Duration::hours(hours)))
                            .earliest()
                    })
                })
                .map(|dt| dt.fixed_offset()),
        }
    }

    fn label(&self) -> String {
        match self {
            ScheduleZone::Fixed(offset) => format_offset(*offset),
            ScheduleZone::Named(tz) => tz.name().to_string(),
        }
    }
}

/// A validated daily trigger at a fixed local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySchedule {
    time: NaiveTime,
    zone: ScheduleZone,
    cron_expression: String,
    timezone: String,
}

impl DailySchedule {
    /// Parses a five-field cron expression of the form `M H * * *`.
    pub fn parse(settings: &ScheduleSettings) -> Result<Self, ScheduleError> {
        let cron = settings.cron.trim();
        let invalid = |reason| ScheduleError::InvalidCron(cron.to_string(), reason);

        let fields: Vec<&str> = cron.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid("expected 5 fields"));
        }
        if fields[2..].iter().any(|f| *f != "*") {
            return Err(invalid("only daily schedules (M H * * *) are supported"));
        }
        let minute: u32 = fields[0].parse().map_err(|_| invalid("minute is not a number"))?;
        let hour: u32 = fields[1].parse().map_err(|_| invalid("hour is not a number"))?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| invalid("hour or minute out of range"))?;

        let zone = parse_timezone(&settings.timezone)?;

        Ok(Self {
            time,
            zone,
            cron_expression: cron.to_string(),
            timezone: settings.timezone.trim().to_string(),
        })
    }

    pub fn cron_expression(&self) -> &str {
        &self.cron_expression
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Next fire time strictly after `now`: today's scheduled time in the
    /// target timezone, or tomorrow's if that has already passed.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        let mut day = self.zone.local_now(now).date();
        loop {
            if let Some(candidate) = self.zone.resolve(day.and_time(self.time)) {
                if candidate > now {
                    return candidate;
                }
            }
            day += Duration::days(1);
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "Daily at {} ({})",
            self.time.format("%H:%M"),
            self.zone.label()
        )
    }
}

fn parse_timezone(timezone: &str) -> Result<ScheduleZone, ScheduleError> {
    let tz = timezone.trim();
    let invalid = || ScheduleError::InvalidTimezone(tz.to_string());

    if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return FixedOffset::east_opt(0)
            .map(ScheduleZone::Fixed)
            .ok_or_else(invalid);
    }

    let tz_body = tz.strip_prefix("UTC").unwrap_or(tz);
    let (sign, rest) = match tz_body.as_bytes().first() {
        Some(b'+') => (1, &tz_body[1..]),
        Some(b'-') => (-1, &tz_body[1..]),
        _ => return tz.parse::<Tz>().map(ScheduleZone::Named).map_err(|_| invalid()),
    };
    if !rest.is_ascii() {
        return Err(invalid());
    }
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .map(ScheduleZone::Fixed)
        .ok_or_else(invalid)
}

fn format_offset(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    if secs == 0 {
        return "UTC".to_string();
    }
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("UTC{}{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60)
}
