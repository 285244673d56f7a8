use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use chronicle_core::{AppError, AppResult};

const QUARTER_START_MONTHS: [u32; 4] = [1, 4, 7, 10];

/// Recurring trigger on a fixed day of each quarter's first month, at a fixed
/// local time in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuarterlySchedule {
    day_of_month: u32,
    time_of_day: NaiveTime,
    offset: FixedOffset,
}

impl QuarterlySchedule {
    /// Creates a schedule; `day_of_month` must exist in every month.
    pub fn new(day_of_month: u32, time_of_day: NaiveTime, offset: FixedOffset) -> AppResult<Self> {
        if !(1..=28).contains(&day_of_month) {
            return Err(AppError::Validation(format!(
                "schedule day_of_month must be between 1 and 28, got {day_of_month}"
            )));
        }

        Ok(Self {
            day_of_month,
            time_of_day,
            offset,
        })
    }

    /// Parses `HH:MM` and `+HH:MM` / `-HH:MM` settings into a schedule.
    pub fn parse(day_of_month: u32, time_of_day: &str, utc_offset: &str) -> AppResult<Self> {
        let time_of_day = NaiveTime::parse_from_str(time_of_day.trim(), "%H:%M").map_err(|error| {
            AppError::Validation(format!("invalid schedule time '{time_of_day}': {error}"))
        })?;

        Self::new(day_of_month, time_of_day, parse_utc_offset(utc_offset)?)
    }

    /// Returns the first trigger strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_now = now.with_timezone(&self.offset);

        (local_now.year()..=local_now.year() + 1)
            .flat_map(|year| QUARTER_START_MONTHS.iter().map(move |month| (year, *month)))
            .filter_map(|(year, month)| {
                let date = NaiveDate::from_ymd_opt(year, month, self.day_of_month)?;
                self.offset
                    .from_local_datetime(&date.and_time(self.time_of_day))
                    .single()
            })
            .find(|candidate| *candidate > local_now)
            .map(|candidate| candidate.with_timezone(&Utc))
            .unwrap_or(now)
    }

    /// Returns the configured UTC offset.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

fn parse_utc_offset(value: &str) -> AppResult<FixedOffset> {
    let invalid = || {
        AppError::Validation(format!(
            "invalid UTC offset '{value}', expected +HH:MM or -HH:MM"
        ))
    };

    let trimmed = value.trim();
    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours = hours.parse::<i32>().map_err(|_| invalid())?;
    let minutes = minutes.parse::<i32>().map_err(|_| invalid())?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
