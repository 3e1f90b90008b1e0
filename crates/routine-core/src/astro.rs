//! Astronomical time source
//!
//! Sunrise/sunset instants come from an external provider. When the provider
//! is unavailable, schedule conditions that depend on it evaluate to false
//! until it recovers.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use thiserror::Error;

/// Astronomical source failure
#[derive(Debug, Clone, Error)]
pub enum AstroError {
    #[error("astronomical source unavailable: {0}")]
    Unavailable(String),
}

/// Provides sunrise/sunset instants for a calendar date
pub trait AstroSource: Send + Sync {
    fn sunrise(&self, date: NaiveDate) -> Result<DateTime<Local>, AstroError>;
    fn sunset(&self, date: NaiveDate) -> Result<DateTime<Local>, AstroError>;
}

/// Fixed-time astronomical source
///
/// Returns the same clock times every day. Useful for tests and for
/// locations configured with static civil twilight times.
#[derive(Debug, Clone)]
pub struct FixedAstro {
    sunrise: NaiveTime,
    sunset: NaiveTime,
}

impl FixedAstro {
    pub fn new(sunrise: NaiveTime, sunset: NaiveTime) -> Self {
        Self { sunrise, sunset }
    }

    fn at(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Local>, AstroError> {
        Local
            .from_local_datetime(&date.and_time(time))
            .single()
            .ok_or_else(|| AstroError::Unavailable(format!("ambiguous local time on {date}")))
    }
}

impl AstroSource for FixedAstro {
    fn sunrise(&self, date: NaiveDate) -> Result<DateTime<Local>, AstroError> {
        self.at(date, self.sunrise)
    }

    fn sunset(&self, date: NaiveDate) -> Result<DateTime<Local>, AstroError> {
        self.at(date, self.sunset)
    }
}
