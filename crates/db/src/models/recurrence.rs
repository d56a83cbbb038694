//! Recurrence configuration carried by recurring task definitions.
//!
//! The `tasks` table keeps the day selections as JSON text. They are parsed here,
//! once, into typed values so the date resolver never inspects raw shapes.

use std::{fmt, str::FromStr};

use chrono::Weekday;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use utils::calendar::Occurrence;

use super::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecurrenceConfigError {
    #[error("recurring task has no recurrence pattern")]
    MissingPattern,
    #[error("unrecognized recurrence pattern: {0}")]
    UnknownPattern(String),
    #[error("invalid recurrence_days_of_week: {0}")]
    InvalidDaysOfWeek(String),
    #[error("invalid recurrence_days_of_month: {0}")]
    InvalidDaysOfMonth(String),
}

impl RecurrenceConfigError {
    /// Pattern problems leave nothing to schedule; day problems still have a fallback.
    pub fn is_pattern_error(&self) -> bool {
        matches!(
            self,
            RecurrenceConfigError::MissingPattern | RecurrenceConfigError::UnknownPattern(_)
        )
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// The `day` half of a relative monthly pattern: either a plain calendar day
/// ("the last day") or a weekday ("the last Friday").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RelativeDay {
    Day,
    Weekday(Weekday),
}

impl FromStr for RelativeDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("day") {
            return Ok(RelativeDay::Day);
        }
        s.parse::<Weekday>()
            .map(RelativeDay::Weekday)
            .map_err(|_| format!("'{s}' is neither 'day' nor a weekday name"))
    }
}

impl TryFrom<String> for RelativeDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RelativeDay> for String {
    fn from(value: RelativeDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RelativeDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelativeDay::Day => "day",
            RelativeDay::Weekday(Weekday::Mon) => "Monday",
            RelativeDay::Weekday(Weekday::Tue) => "Tuesday",
            RelativeDay::Weekday(Weekday::Wed) => "Wednesday",
            RelativeDay::Weekday(Weekday::Thu) => "Thursday",
            RelativeDay::Weekday(Weekday::Fri) => "Friday",
            RelativeDay::Weekday(Weekday::Sat) => "Saturday",
            RelativeDay::Weekday(Weekday::Sun) => "Sunday",
        };
        f.write_str(name)
    }
}

/// Which days of the month a monthly definition lands on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayOfMonthSpec {
    /// Explicit calendar days, e.g. the 1st and the 15th.
    Absolute(Vec<u8>),
    /// A position within the month, e.g. the last Friday.
    Relative { week: Occurrence, day: RelativeDay },
}

#[derive(Deserialize)]
struct RelativeDescriptor {
    week: Occurrence,
    day: RelativeDay,
}

/// Shapes found in stored data. A relative descriptor may arrive bare or wrapped
/// in a one-element list.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDayOfMonth {
    Days(Vec<u8>),
    Relative(RelativeDescriptor),
    RelativeList(Vec<RelativeDescriptor>),
}

impl<'de> Deserialize<'de> for DayOfMonthSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match StoredDayOfMonth::deserialize(deserializer)? {
            StoredDayOfMonth::Days(days) => Ok(DayOfMonthSpec::Absolute(days)),
            StoredDayOfMonth::Relative(RelativeDescriptor { week, day }) => {
                Ok(DayOfMonthSpec::Relative { week, day })
            }
            StoredDayOfMonth::RelativeList(mut list) => {
                if list.len() != 1 {
                    return Err(serde::de::Error::custom(format!(
                        "expected a single relative pattern, found {}",
                        list.len()
                    )));
                }
                let RelativeDescriptor { week, day } = list.remove(0);
                Ok(DayOfMonthSpec::Relative { week, day })
            }
        }
    }
}

impl Serialize for DayOfMonthSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum Repr<'a> {
            Days(&'a [u8]),
            Relative { week: Occurrence, day: RelativeDay },
        }

        match self {
            DayOfMonthSpec::Absolute(days) => Repr::Days(days).serialize(serializer),
            DayOfMonthSpec::Relative { week, day } => Repr::Relative {
                week: *week,
                day: *day,
            }
            .serialize(serializer),
        }
    }
}

/// Typed view of a definition's recurrence columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub pattern: RecurrencePattern,
    /// Periods between occurrences, at least 1.
    pub interval: u32,
    /// Weekday indices, 0 = Sunday. Empty means "same weekday as the anchor".
    pub days_of_week: Vec<u8>,
    pub days_of_month: Option<DayOfMonthSpec>,
}

impl RecurrenceRule {
    pub fn new(pattern: RecurrencePattern, interval: u32) -> Self {
        Self {
            pattern,
            interval: interval.max(1),
            days_of_week: Vec::new(),
            days_of_month: None,
        }
    }

    pub fn with_days_of_week(mut self, days: Vec<u8>) -> Self {
        self.days_of_week = days;
        self
    }

    pub fn with_days_of_month(mut self, spec: DayOfMonthSpec) -> Self {
        self.days_of_month = Some(spec);
        self
    }

    pub fn from_task(task: &Task) -> Result<Self, RecurrenceConfigError> {
        let raw_pattern = task
            .recurrence_pattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(RecurrenceConfigError::MissingPattern)?;
        let pattern = raw_pattern
            .parse::<RecurrencePattern>()
            .map_err(|_| RecurrenceConfigError::UnknownPattern(raw_pattern.to_string()))?;

        let days_of_week = match task.recurrence_days_of_week.as_deref() {
            Some(json) if !json.trim().is_empty() => serde_json::from_str::<Vec<u8>>(json)
                .map_err(|e| RecurrenceConfigError::InvalidDaysOfWeek(e.to_string()))?,
            _ => Vec::new(),
        };

        let days_of_month = match task.recurrence_days_of_month.as_deref() {
            Some(json) if !json.trim().is_empty() => Some(
                serde_json::from_str::<DayOfMonthSpec>(json)
                    .map_err(|e| RecurrenceConfigError::InvalidDaysOfMonth(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            pattern,
            interval: u32::try_from(task.recurrence_interval).unwrap_or(0).max(1),
            days_of_week,
            days_of_month,
        })
    }
}
