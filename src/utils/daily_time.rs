use std::str::FromStr;

use lazy_regex::regex_captures;
use thiserror::Error;
use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// A time of day in UTC at which something runs every day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailyTime(Time);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DailyTimeParseError {
    #[error("Expected `HH:MM` or `HH:MM:SS`, got `{0}`")]
    Format(String),
    #[error("No such time of day: `{0}`")]
    OutOfRange(String),
}

impl DailyTime {
    pub const fn new(time: Time) -> DailyTime {
        DailyTime(time)
    }

    /// The first moment strictly after `now` that falls on this time of day.
    pub fn next_after(&self, now: OffsetDateTime) -> OffsetDateTime {
        let now = now.to_offset(UtcOffset::UTC);
        let today = now.replace_time(self.0);

        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

impl FromStr for DailyTime {
    type Err = DailyTimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (_, hour, minute, _, second) = regex_captures!(r"^(\d{1,2}):(\d{2})(:(\d{2}))?$", s)
            .ok_or_else(|| DailyTimeParseError::Format(s.to_string()))?;

        let out_of_range = || DailyTimeParseError::OutOfRange(s.to_string());

        let hour = hour.parse().map_err(|_| out_of_range())?;
        let minute = minute.parse().map_err(|_| out_of_range())?;
        let second = if second.is_empty() {
            0
        } else {
            second.parse().map_err(|_| out_of_range())?
        };

        let time = Time::from_hms(hour, minute, second).map_err(|_| out_of_range())?;

        Ok(DailyTime(time))
    }
}
