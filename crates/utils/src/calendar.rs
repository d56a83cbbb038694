//! Calendar arithmetic on plain dates.
//!
//! Everything here works on [`NaiveDate`]: no time of day, no timezone. Month and
//! year offsets clamp to the last valid day of the target month, so Jan 31 plus one
//! month is the last day of February rather than an error or a date in March.

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("no such day: {0}")]
    NotFound(String),
    #[error("date arithmetic out of range")]
    OutOfRange,
}

/// Which occurrence inside a month a relative pattern refers to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(try_from = "String", into = "String")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Occurrence {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Last,
}

impl TryFrom<String> for Occurrence {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .trim()
            .parse()
            .map_err(|_| format!("'{value}' is not an occurrence"))
    }
}

impl From<Occurrence> for String {
    fn from(value: Occurrence) -> Self {
        value.to_string()
    }
}

impl Occurrence {
    /// 1-based position, `None` for [`Occurrence::Last`].
    pub fn ordinal(self) -> Option<u8> {
        match self {
            Occurrence::First => Some(1),
            Occurrence::Second => Some(2),
            Occurrence::Third => Some(3),
            Occurrence::Fourth => Some(4),
            Occurrence::Fifth => Some(5),
            Occurrence::Last => None,
        }
    }
}

/// Weekday for an index where 0 is Sunday.
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Index of `weekday` where 0 is Sunday.
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

/// Sunday that starts the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

pub fn days_in_month(year: i32, month: u32) -> Result<u32, CalendarError> {
    let first = first_of_month(year, month)?;
    let next = first
        .checked_add_months(Months::new(1))
        .ok_or(CalendarError::OutOfRange)?;
    Ok(next.signed_duration_since(first).num_days() as u32)
}

pub fn add_months_clamped(date: NaiveDate, months: i32) -> Result<NaiveDate, CalendarError> {
    let step = Months::new(months.unsigned_abs());
    let shifted = if months >= 0 {
        date.checked_add_months(step)
    } else {
        date.checked_sub_months(step)
    };
    shifted.ok_or(CalendarError::OutOfRange)
}

/// Feb 29 lands on Feb 28 when the target year is not a leap year.
pub fn add_years_clamped(date: NaiveDate, years: i32) -> Result<NaiveDate, CalendarError> {
    let months = years.checked_mul(12).ok_or(CalendarError::OutOfRange)?;
    add_months_clamped(date, months)
}

/// The `occurrence`-th `weekday` of the month, e.g. the last Friday of February.
pub fn nth_weekday_of_month(
    year: i32,
    month: u32,
    occurrence: Occurrence,
    weekday: Weekday,
) -> Result<NaiveDate, CalendarError> {
    match occurrence.ordinal() {
        Some(n) => NaiveDate::from_weekday_of_month_opt(year, month, weekday, n).ok_or_else(|| {
            CalendarError::NotFound(format!("{occurrence} {weekday} of {year}-{month:02}"))
        }),
        None => {
            let last = last_of_month(year, month)?;
            let back = (7 + last.weekday().num_days_from_sunday()
                - weekday.num_days_from_sunday())
                % 7;
            Ok(last - Duration::days(i64::from(back)))
        }
    }
}

/// The `occurrence`-th calendar day of the month, or its last day.
pub fn nth_day_of_month(
    year: i32,
    month: u32,
    occurrence: Occurrence,
) -> Result<NaiveDate, CalendarError> {
    match occurrence.ordinal() {
        Some(n) => NaiveDate::from_ymd_opt(year, month, u32::from(n)).ok_or_else(|| {
            CalendarError::NotFound(format!("day {n} of {year}-{month:02}"))
        }),
        None => last_of_month(year, month),
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CalendarError::NotFound(format!("month {year}-{month:02}")))
}

fn last_of_month(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    let days = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, days)
        .ok_or_else(|| CalendarError::NotFound(format!("last day of {year}-{month:02}")))
}
