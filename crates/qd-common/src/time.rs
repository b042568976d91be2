//! Time zone normalisation and time formatting helpers.
//!
//! Querydata stores valid times in UTC. All frame timing, file naming and
//! timestamp text work on times converted to the zone selected with
//! `timestampzone`, represented as naive wall-clock times.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QdError, QdResult};

/// Time zone used to present and align times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimeZoneSpec {
    Utc,
    /// The zone of the running process.
    #[default]
    Local,
    /// Fixed offset east of UTC in seconds.
    Fixed(i32),
}

impl TimeZoneSpec {
    /// Parse `utc`, `local` or a fixed offset such as `+02:00`, `-0330`, `+3`.
    pub fn parse(s: &str) -> QdResult<Self> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "utc" | "gmt" | "z" => return Ok(TimeZoneSpec::Utc),
            "local" => return Ok(TimeZoneSpec::Local),
            _ => {}
        }

        let unknown = || QdError::UnknownTimeZone(s.to_string());
        let rest = lower
            .strip_prefix("utc")
            .unwrap_or(lower.as_str());
        let (sign, digits) = match rest.chars().next() {
            Some('+') => (1, &rest[1..]),
            Some('-') => (-1, &rest[1..]),
            _ => return Err(unknown()),
        };
        let digits: String = digits.chars().filter(|c| *c != ':').collect();
        let (hours, minutes) = match digits.len() {
            1 | 2 => (digits.parse::<i32>().map_err(|_| unknown())?, 0),
            4 => (
                digits[..2].parse::<i32>().map_err(|_| unknown())?,
                digits[2..].parse::<i32>().map_err(|_| unknown())?,
            ),
            _ => return Err(unknown()),
        };
        if hours > 14 || minutes >= 60 {
            return Err(unknown());
        }
        Ok(TimeZoneSpec::Fixed(sign * (hours * 3600 + minutes * 60)))
    }

    /// Convert a UTC time to wall-clock time in this zone.
    pub fn from_utc(&self, utc: NaiveDateTime) -> NaiveDateTime {
        match self {
            TimeZoneSpec::Utc => utc,
            TimeZoneSpec::Local => Local.from_utc_datetime(&utc).naive_local(),
            TimeZoneSpec::Fixed(secs) => match FixedOffset::east_opt(*secs) {
                Some(offset) => offset.from_utc_datetime(&utc).naive_local(),
                None => utc,
            },
        }
    }

    /// Convert a system timestamp (e.g. a file modification time) to wall-clock time.
    pub fn from_system(&self, time: std::time::SystemTime) -> NaiveDateTime {
        let utc: DateTime<Utc> = time.into();
        self.from_utc(utc.naive_utc())
    }
}

/// `YYYYMMDDHHMM`, as used in output file names.
pub fn format_yyyymmddhhmm(t: &NaiveDateTime) -> String {
    t.format("%Y%m%d%H%M").to_string()
}

/// `DDHHMM`, as used for querydata modification stamps.
pub fn format_ddhhmm(t: &NaiveDateTime) -> String {
    t.format("%d%H%M").to_string()
}

/// `hh:mi dd.mm.yyyy`
pub fn format_clock_date(t: &NaiveDateTime) -> String {
    format!(
        "{:02}:{:02} {:02}.{:02}.{:04}",
        t.hour(),
        t.minute(),
        t.day(),
        t.month(),
        t.year()
    )
}

/// `dd.mm.yyyy hh:mi`
pub fn format_date_clock(t: &NaiveDateTime) -> String {
    format!(
        "{:02}.{:02}.{:04} {:02}:{:02}",
        t.day(),
        t.month(),
        t.year(),
        t.hour(),
        t.minute()
    )
}

/// Whole minutes from `earlier` to `later` (negative if `later` is before `earlier`).
pub fn minutes_between(earlier: &NaiveDateTime, later: &NaiveDateTime) -> i64 {
    (*later - *earlier).num_minutes()
}

pub fn add_minutes(t: &NaiveDateTime, minutes: i64) -> NaiveDateTime {
    *t + Duration::minutes(minutes)
}

/// Round to the nearest multiple of `step` minutes counted from midnight
/// of 1970-01-01. Seconds are discarded first. Steps below one minute
/// only truncate seconds.
pub fn round_to_step(t: &NaiveDateTime, step: i64) -> NaiveDateTime {
    let truncated = t
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(*t);
    if step <= 1 {
        return truncated;
    }
    let minutes = truncated.and_utc().timestamp().div_euclid(60);
    let rem = minutes.rem_euclid(step);
    let rounded = if rem * 2 >= step {
        minutes - rem + step
    } else {
        minutes - rem
    };
    DateTime::from_timestamp(rounded * 60, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or(truncated)
}
