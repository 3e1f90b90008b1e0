//! Schedule subexpressions and the schedule resolver
//!
//! Five shapes are supported: absolute `at`, weekly `at`, weekly `from`/`to`
//! (with an optional day offset on `to`), weekly `from`/`for`, and absolute
//! `from`/`to` spanning explicit dates. Anchors are a time of day, or a
//! signed offset in seconds from sunrise or sunset (negative = before).
//!
//! The resolver is pure given (now, schedule, astronomical source) and is
//! re-invoked on every evaluation cycle; nothing is cached across days.
//! Instant forms are considered active for a short grace window after the
//! instant so that a periodic tick cannot step over them.

use chrono::{DateTime, Datelike, Days, Duration, Local, NaiveDate, NaiveTime, TimeZone, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use routine_core::{AstroError, AstroSource};

/// How long an instant-form schedule stays true after its instant
///
/// Plays the role of a misfire grace period: a tick that lands anywhere in
/// the window still observes the schedule as active, and there is no
/// retroactive firing once the window has passed.
pub const INSTANT_GRACE_SECS: i64 = 60;

/// Schedule resolution failure
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Astro(#[from] AstroError),

    #[error("time does not exist in the local timezone on {0}")]
    NonexistentLocalTime(NaiveDate),
}

/// A time of day, parsed from "HH:MM" or "HH:MM:SS"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(pub NaiveTime);

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .map(TimeOfDay)
            .map_err(|_| format!("expected HH:MM or HH:MM:SS, got {s:?}"))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> String {
        t.0.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M:%S"))
    }
}

/// A set of weekdays, parsed from "mon,tue,..." (order preserved)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DaySet(Vec<Weekday>);

impl DaySet {
    pub fn contains(&self, day: Weekday) -> bool {
        self.0.contains(&day)
    }

    pub fn days(&self) -> &[Weekday] {
        &self.0
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

impl FromStr for DaySet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut days = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let day = match part {
                "mon" => Weekday::Mon,
                "tue" => Weekday::Tue,
                "wed" => Weekday::Wed,
                "thu" => Weekday::Thu,
                "fri" => Weekday::Fri,
                "sat" => Weekday::Sat,
                "sun" => Weekday::Sun,
                other => return Err(format!("invalid weekday: {other:?}")),
            };
            if !days.contains(&day) {
                days.push(day);
            }
        }
        if days.is_empty() {
            return Err("day set is empty".into());
        }
        Ok(DaySet(days))
    }
}

impl TryFrom<String> for DaySet {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DaySet> for String {
    fn from(set: DaySet) -> String {
        set.0
            .iter()
            .map(|d| weekday_name(*d))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Anchor for a schedule boundary: clock time or a sun offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeAnchor {
    /// Fixed time of day
    Time { time: TimeOfDay },

    /// Offset in signed seconds from sunrise
    Sunrise { sunrise: i64 },

    /// Offset in signed seconds from sunset
    Sunset { sunset: i64 },
}

impl TimeAnchor {
    /// Resolve the anchor to a concrete instant on the given date
    pub fn resolve(
        &self,
        date: NaiveDate,
        astro: &dyn AstroSource,
    ) -> Result<DateTime<Local>, ScheduleError> {
        match self {
            TimeAnchor::Time { time } => Local
                .from_local_datetime(&date.and_time(time.0))
                .earliest()
                .ok_or(ScheduleError::NonexistentLocalTime(date)),
            TimeAnchor::Sunrise { sunrise } => {
                Ok(astro.sunrise(date)? + Duration::seconds(*sunrise))
            }
            TimeAnchor::Sunset { sunset } => Ok(astro.sunset(date)? + Duration::seconds(*sunset)),
        }
    }
}

/// Duration expressed in clock components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DurationSpec {
    #[serde(default)]
    pub hours: u32,

    #[serde(default)]
    pub minutes: u32,

    #[serde(default)]
    pub seconds: u32,
}

impl DurationSpec {
    pub fn to_duration(self) -> Duration {
        Duration::seconds(
            i64::from(self.hours) * 3600 + i64::from(self.minutes) * 60 + i64::from(self.seconds),
        )
    }

    pub fn is_zero(self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }
}

/// End anchor of a weekly interval, with a calendar-day offset
///
/// `day` counts days from the start boundary's day (0 = same day,
/// 1 = tomorrow, ...), which is how an interval crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToAnchor {
    #[serde(flatten)]
    pub anchor: TimeAnchor,

    #[serde(default)]
    pub day: u32,
}

/// A boundary anchored to an explicit calendar date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatedAnchor {
    #[serde(flatten)]
    pub anchor: TimeAnchor,

    #[serde(with = "date_serde")]
    pub date: NaiveDate,
}

/// Absolute `at` body: an anchor, optionally pinned to one date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsoluteAt {
    #[serde(flatten)]
    pub anchor: TimeAnchor,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_date_serde"
    )]
    pub date: Option<NaiveDate>,
}

/// Body of a weekly schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeeklyBody {
    /// Fires at an instant on each listed day
    At { at: TimeAnchor },

    /// Active over [from, to) on each listed day
    FromTo { from: TimeAnchor, to: ToAnchor },

    /// Active over [from, from + for) on each listed day
    FromFor {
        from: TimeAnchor,
        r#for: DurationSpec,
    },
}

/// Weekly schedule: a day set plus a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub days: DaySet,

    #[serde(flatten)]
    pub body: WeeklyBody,
}

/// A schedule subexpression, one of the five supported shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleExpr {
    /// Absolute instant, daily unless pinned to a date
    At { at: AbsoluteAt },

    /// Weekly instant or interval over a day set
    Weekly { weekly: WeeklySchedule },

    /// One concrete interval between two dated boundaries (non-recurring)
    Span { from: DatedAnchor, to: DatedAnchor },
}

/// Whether `now` lies in the grace window after an instant
fn in_grace(now: DateTime<Local>, instant: DateTime<Local>) -> bool {
    now >= instant && now < instant + Duration::seconds(INSTANT_GRACE_SECS)
}

/// Resolve a schedule against "now": is it currently active?
///
/// Interval forms are half-open `[start, end)`. Recurring forms are checked
/// against today and enough preceding days to cover day offsets and
/// durations that cross midnight; the day set always matches the weekday of
/// the interval's *start* day.
pub fn resolve(
    schedule: &ScheduleExpr,
    now: DateTime<Local>,
    astro: &dyn AstroSource,
) -> Result<bool, ScheduleError> {
    match schedule {
        ScheduleExpr::At { at } => {
            if let Some(date) = at.date {
                return Ok(in_grace(now, at.anchor.resolve(date, astro)?));
            }
            // Daily recurrence; yesterday covers grace spill across midnight
            for back in 0..=1u64 {
                let base = now.date_naive() - Days::new(back);
                if in_grace(now, at.anchor.resolve(base, astro)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        ScheduleExpr::Weekly { weekly } => match &weekly.body {
            WeeklyBody::At { at } => {
                for back in 0..=1u64 {
                    let base = now.date_naive() - Days::new(back);
                    if weekly.days.contains(base.weekday())
                        && in_grace(now, at.resolve(base, astro)?)
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            WeeklyBody::FromTo { from, to } => {
                let lookback = u64::from(to.day) + 1;
                for back in 0..=lookback {
                    let base = now.date_naive() - Days::new(back);
                    if !weekly.days.contains(base.weekday()) {
                        continue;
                    }
                    let start = from.resolve(base, astro)?;
                    let end_date = base + Days::new(u64::from(to.day));
                    let mut end = to.anchor.resolve(end_date, astro)?;
                    if end <= start && to.day == 0 {
                        // Implicit midnight rollover for end-before-start windows
                        end += Duration::days(1);
                    }
                    if start <= now && now < end {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            WeeklyBody::FromFor { from, r#for } => {
                let duration = r#for.to_duration();
                let lookback = (duration.num_days() as u64) + 1;
                for back in 0..=lookback {
                    let base = now.date_naive() - Days::new(back);
                    if !weekly.days.contains(base.weekday()) {
                        continue;
                    }
                    let start = from.resolve(base, astro)?;
                    if start <= now && now < start + duration {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        },

        ScheduleExpr::Span { from, to } => {
            let start = from.anchor.resolve(from.date, astro)?;
            let end = to.anchor.resolve(to.date, astro)?;
            Ok(start <= now && now < end)
        }
    }
}

mod date_serde {
    use chrono::NaiveDate;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y/%m/%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(de)?;
        NaiveDate::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

mod opt_date_serde {
    use chrono::NaiveDate;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y/%m/%d";

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, ser: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => ser.serialize_some(&d.format(FORMAT).to_string()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveDate>, D::Error> {
        let s: Option<String> = Option::deserialize(de)?;
        s.map(|s| NaiveDate::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom))
            .transpose()
    }
}
