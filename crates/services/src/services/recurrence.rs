//! Next-due-date resolution for recurring task definitions.
//!
//! Resolution never fails outright. A definition whose pattern is missing or
//! unknown resolves to `None`; any other configuration problem falls back to the
//! day after the anchor and logs a warning, so one bad row cannot stall a sweep.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use db::models::{
    recurrence::{DayOfMonthSpec, RecurrencePattern, RecurrenceRule, RelativeDay},
    task::Task,
};
use thiserror::Error;
use tracing::warn;
use utils::calendar::{
    self, CalendarError, add_months_clamped, add_years_clamped, nth_day_of_month,
    nth_weekday_of_month, week_start, weekday_from_index,
};

/// Upper bound on candidate months examined for a monthly definition.
const MAX_MONTH_CANDIDATES: u32 = 365;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no configured weekday is a valid index (0 = Sunday .. 6 = Saturday)")]
    NoValidWeekdays,
    #[error("no configured day of month is in 1..=31")]
    NoValidMonthDays,
    #[error("no matching weekday found after {0}")]
    WeekdayNotFound(NaiveDate),
    #[error("no matching day of month found after {0}")]
    MonthDayNotFound(NaiveDate),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecurrenceResolver;

impl RecurrenceResolver {
    /// Next due date for `definition`, anchored at `last_generated` when an
    /// instance exists and at the definition's own due date otherwise.
    pub fn next_due_date(
        &self,
        definition: &Task,
        last_generated: Option<NaiveDate>,
    ) -> Option<NaiveDate> {
        let Some(anchor) = last_generated.or(definition.due_date) else {
            warn!(
                task_id = %definition.id,
                "Recurring task has neither a due date nor generated instances; nothing to anchor on"
            );
            return None;
        };

        let rule = match RecurrenceRule::from_task(definition) {
            Ok(rule) => rule,
            Err(e) if e.is_pattern_error() => {
                warn!(task_id = %definition.id, error = %e, "Skipping recurring task");
                return None;
            }
            Err(e) => {
                warn!(
                    task_id = %definition.id,
                    error = %e,
                    "Unusable recurrence days, falling back to the next day"
                );
                return anchor.checked_add_days(Days::new(1));
            }
        };

        match self.next_after(&rule, anchor) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(
                    task_id = %definition.id,
                    anchor = %anchor,
                    error = %e,
                    "Could not resolve next occurrence, falling back to the next day"
                );
                anchor.checked_add_days(Days::new(1))
            }
        }
    }

    /// First occurrence of `rule` strictly after `anchor`.
    pub fn next_after(
        &self,
        rule: &RecurrenceRule,
        anchor: NaiveDate,
    ) -> Result<NaiveDate, ResolveError> {
        let interval = rule.interval.max(1);
        match rule.pattern {
            RecurrencePattern::Daily => anchor
                .checked_add_days(Days::new(u64::from(interval)))
                .ok_or(ResolveError::Calendar(CalendarError::OutOfRange)),
            RecurrencePattern::Weekly => next_weekly(&rule.days_of_week, interval, anchor),
            RecurrencePattern::Monthly => match &rule.days_of_month {
                None => Ok(add_months_clamped(anchor, signed(interval)?)?),
                Some(DayOfMonthSpec::Absolute(days)) if days.is_empty() => {
                    Ok(add_months_clamped(anchor, signed(interval)?)?)
                }
                Some(DayOfMonthSpec::Absolute(days)) => next_absolute_day(days, interval, anchor),
                Some(DayOfMonthSpec::Relative { week, day }) => {
                    next_relative_day(*week, *day, interval, anchor)
                }
            },
            RecurrencePattern::Yearly => Ok(add_years_clamped(anchor, signed(interval)?)?),
        }
    }
}

fn signed(interval: u32) -> Result<i32, ResolveError> {
    i32::try_from(interval).map_err(|_| ResolveError::Calendar(CalendarError::OutOfRange))
}

fn next_weekly(days: &[u8], interval: u32, anchor: NaiveDate) -> Result<NaiveDate, ResolveError> {
    if days.is_empty() {
        return anchor
            .checked_add_days(Days::new(7 * u64::from(interval)))
            .ok_or(ResolveError::Calendar(CalendarError::OutOfRange));
    }

    let weekdays: Vec<Weekday> = days.iter().filter_map(|d| weekday_from_index(*d)).collect();
    if weekdays.is_empty() {
        return Err(ResolveError::NoValidWeekdays);
    }

    aligned_weekday(&weekdays, interval, anchor, (2 * u64::from(interval) + 2) * 7)
        .or_else(|| first_weekday_within(&weekdays, interval, anchor))
        .ok_or(ResolveError::WeekdayNotFound(anchor))
}

/// First configured weekday within `horizon_days` of the anchor whose week is a
/// multiple of `interval` weeks from the anchor's week.
fn aligned_weekday(
    weekdays: &[Weekday],
    interval: u32,
    anchor: NaiveDate,
    horizon_days: u64,
) -> Option<NaiveDate> {
    let interval = u64::from(interval);
    let anchor_week = week_start(anchor);
    (1..=horizon_days)
        .map_while(|offset| anchor.checked_add_days(Days::new(offset)))
        .filter(|candidate| weekdays.contains(&candidate.weekday()))
        .find(|candidate| {
            let weeks_from_anchor = (week_start(*candidate) - anchor_week).num_days() / 7;
            weeks_from_anchor.unsigned_abs() % interval == 0
        })
}

/// Best effort: the first configured weekday within one interval, aligned or not.
fn first_weekday_within(weekdays: &[Weekday], interval: u32, anchor: NaiveDate) -> Option<NaiveDate> {
    (1..=u64::from(interval) * 7)
        .map_while(|offset| anchor.checked_add_days(Days::new(offset)))
        .find(|candidate| weekdays.contains(&candidate.weekday()))
}

/// First day of the month `k * interval` months after the anchor's month.
fn candidate_month(anchor: NaiveDate, k: u32, interval: u32) -> Result<(i32, u32), ResolveError> {
    let first = anchor.with_day(1).ok_or(CalendarError::OutOfRange)?;
    let offset = k
        .checked_mul(interval)
        .ok_or(ResolveError::Calendar(CalendarError::OutOfRange))?;
    let month = add_months_clamped(first, signed(offset)?)?;
    Ok((month.year(), month.month()))
}

fn next_absolute_day(
    days: &[u8],
    interval: u32,
    anchor: NaiveDate,
) -> Result<NaiveDate, ResolveError> {
    let mut days: Vec<u32> = days
        .iter()
        .filter(|d| (1..=31).contains(*d))
        .map(|d| u32::from(*d))
        .collect();
    if days.is_empty() {
        return Err(ResolveError::NoValidMonthDays);
    }
    days.sort_unstable();
    days.dedup();

    for k in 0..MAX_MONTH_CANDIDATES {
        let (year, month) = candidate_month(anchor, k, interval)?;
        // Days missing from this month (the 31st in April) are skipped, not clamped.
        if let Some(date) = days
            .iter()
            .filter_map(|d| NaiveDate::from_ymd_opt(year, month, *d))
            .find(|date| *date > anchor)
        {
            return Ok(date);
        }
    }

    Err(ResolveError::MonthDayNotFound(anchor))
}

fn next_relative_day(
    week: calendar::Occurrence,
    day: RelativeDay,
    interval: u32,
    anchor: NaiveDate,
) -> Result<NaiveDate, ResolveError> {
    for k in 0..MAX_MONTH_CANDIDATES {
        let (year, month) = candidate_month(anchor, k, interval)?;
        let resolved = match day {
            RelativeDay::Day => nth_day_of_month(year, month, week),
            RelativeDay::Weekday(weekday) => nth_weekday_of_month(year, month, week, weekday),
        };
        match resolved {
            Ok(date) if date > anchor => return Ok(date),
            Ok(_) | Err(CalendarError::NotFound(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ResolveError::MonthDayNotFound(anchor))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::task::{TaskPriority, TaskStatus};
    use utils::calendar::Occurrence;
    use uuid::Uuid;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn definition(pattern: Option<&str>, interval: i32, due: Option<NaiveDate>) -> Task {
        Task {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            home_id: None,
            home_component_id: None,
            title: "Test the smoke detectors".to_string(),
            description: None,
            category: None,
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            due_date: due,
            is_recurring: true,
            recurrence_pattern: pattern.map(str::to_string),
            recurrence_interval: interval,
            recurrence_days_of_week: None,
            recurrence_days_of_month: None,
            recurrence_end_date: None,
            parent_task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_daily_sequence_steps_by_interval() {
        let resolver = RecurrenceResolver;
        let task = definition(Some("daily"), 3, Some(date(2024, 1, 30)));

        let mut anchor = None;
        let mut previous = date(2024, 1, 30);
        for _ in 0..20 {
            let next = resolver.next_due_date(&task, anchor).unwrap();
            assert_eq!((next - previous).num_days(), 3);
            previous = next;
            anchor = Some(next);
        }
    }

    #[test]
    fn test_anchor_prefers_last_generated() {
        let resolver = RecurrenceResolver;
        let task = definition(Some("daily"), 1, Some(date(2024, 1, 1)));
        assert_eq!(
            resolver.next_due_date(&task, Some(date(2024, 3, 10))),
            Some(date(2024, 3, 11))
        );
        assert_eq!(resolver.next_due_date(&task, None), Some(date(2024, 1, 2)));
    }

    #[test]
    fn test_weekly_picks_next_configured_weekday() {
        let mut task = definition(Some("weekly"), 1, Some(date(2024, 1, 1)));
        task.recurrence_days_of_week = Some("[3]".to_string());
        assert_eq!(
            RecurrenceResolver.next_due_date(&task, None),
            Some(date(2024, 1, 3))
        );
    }

    #[test]
    fn test_weekly_interval_skips_unaligned_weeks() {
        let rule = RecurrenceRule::new(RecurrencePattern::Weekly, 2).with_days_of_week(vec![1]);
        // Monday 2024-01-01; the following Monday sits in an odd week.
        assert_eq!(
            RecurrenceResolver.next_after(&rule, date(2024, 1, 1)).unwrap(),
            date(2024, 1, 15)
        );

        // Later days in the anchor's own week still count.
        let rule = RecurrenceRule::new(RecurrencePattern::Weekly, 2).with_days_of_week(vec![1, 5]);
        assert_eq!(
            RecurrenceResolver.next_after(&rule, date(2024, 1, 1)).unwrap(),
            date(2024, 1, 5)
        );
    }

    #[test]
    fn test_weekly_unaligned_fallback_takes_first_matching_weekday() {
        let mondays = [Weekday::Mon];
        let anchor = date(2024, 1, 1);
        // One week of horizon holds only the unaligned Monday.
        assert_eq!(aligned_weekday(&mondays, 2, anchor, 7), None);
        assert_eq!(first_weekday_within(&mondays, 2, anchor), Some(date(2024, 1, 8)));
        assert_eq!(aligned_weekday(&mondays, 2, anchor, 42), Some(date(2024, 1, 15)));
        assert_eq!(first_weekday_within(&[], 2, anchor), None);
    }

    #[test]
    fn test_weekly_without_days_uses_plain_cadence() {
        let task = definition(Some("weekly"), 2, Some(date(2024, 1, 1)));
        assert_eq!(
            RecurrenceResolver.next_due_date(&task, None),
            Some(date(2024, 1, 15))
        );
    }

    #[test]
    fn test_weekly_with_unusable_days_falls_back_to_next_day() {
        let mut task = definition(Some("weekly"), 1, Some(date(2024, 1, 1)));
        task.recurrence_days_of_week = Some("[9, 12]".to_string());
        assert_eq!(
            RecurrenceResolver.next_due_date(&task, None),
            Some(date(2024, 1, 2))
        );

        task.recurrence_days_of_week = Some("not json".to_string());
        assert_eq!(
            RecurrenceResolver.next_due_date(&task, None),
            Some(date(2024, 1, 2))
        );
    }

    #[test]
    fn test_monthly_absolute_days() {
        let rule = RecurrenceRule::new(RecurrencePattern::Monthly, 1)
            .with_days_of_month(DayOfMonthSpec::Absolute(vec![15, 1]));
        assert_eq!(
            RecurrenceResolver.next_after(&rule, date(2024, 1, 1)).unwrap(),
            date(2024, 1, 15)
        );
        assert_eq!(
            RecurrenceResolver.next_after(&rule, date(2024, 1, 15)).unwrap(),
            date(2024, 2, 1)
        );
    }

    #[test]
    fn test_monthly_absolute_skips_short_months() {
        let rule = RecurrenceRule::new(RecurrencePattern::Monthly, 1)
            .with_days_of_month(DayOfMonthSpec::Absolute(vec![31]));
        assert_eq!(
            RecurrenceResolver.next_after(&rule, date(2024, 1, 31)).unwrap(),
            date(2024, 3, 31)
        );
    }

    #[test]
    fn test_monthly_relative_last_friday() {
        let mut task = definition(Some("monthly"), 1, Some(date(2024, 1, 31)));
        task.recurrence_days_of_month = Some(r#"{"week": "last", "day": "Friday"}"#.to_string());
        assert_eq!(
            RecurrenceResolver.next_due_date(&task, None),
            Some(date(2024, 2, 23))
        );
    }

    #[test]
    fn test_monthly_relative_with_capitalized_week() {
        let mut task = definition(Some("monthly"), 1, Some(date(2024, 1, 31)));
        task.recurrence_days_of_month = Some(r#"{"week": "Last", "day": "Friday"}"#.to_string());
        assert_eq!(
            RecurrenceResolver.next_due_date(&task, None),
            Some(date(2024, 2, 23))
        );
    }

    #[test]
    fn test_monthly_relative_advances_past_missing_occurrence() {
        let rule = RecurrenceRule::new(RecurrencePattern::Monthly, 1).with_days_of_month(
            DayOfMonthSpec::Relative {
                week: Occurrence::Fifth,
                day: RelativeDay::Weekday(Weekday::Fri),
            },
        );
        // February 2024 has only four Fridays.
        assert_eq!(
            RecurrenceResolver.next_after(&rule, date(2024, 2, 1)).unwrap(),
            date(2024, 3, 29)
        );
    }

    #[test]
    fn test_monthly_relative_first_day() {
        let rule = RecurrenceRule::new(RecurrencePattern::Monthly, 3).with_days_of_month(
            DayOfMonthSpec::Relative {
                week: Occurrence::First,
                day: RelativeDay::Day,
            },
        );
        assert_eq!(
            RecurrenceResolver.next_after(&rule, date(2024, 1, 1)).unwrap(),
            date(2024, 4, 1)
        );
    }

    #[test]
    fn test_monthly_without_days_clamps() {
        let task = definition(Some("monthly"), 1, Some(date(2024, 1, 31)));
        assert_eq!(
            RecurrenceResolver.next_due_date(&task, None),
            Some(date(2024, 2, 29))
        );
    }

    #[test]
    fn test_yearly_clamps_leap_day() {
        let task = definition(Some("yearly"), 1, Some(date(2024, 2, 29)));
        assert_eq!(
            RecurrenceResolver.next_due_date(&task, None),
            Some(date(2025, 2, 28))
        );
    }

    #[test]
    fn test_unknown_or_missing_pattern_resolves_to_none() {
        let resolver = RecurrenceResolver;
        assert_eq!(
            resolver.next_due_date(&definition(Some("hourly"), 1, Some(date(2024, 1, 1))), None),
            None
        );
        assert_eq!(
            resolver.next_due_date(&definition(None, 1, Some(date(2024, 1, 1))), None),
            None
        );
    }

    #[test]
    fn test_no_anchor_resolves_to_none() {
        let task = definition(Some("daily"), 1, None);
        assert_eq!(RecurrenceResolver.next_due_date(&task, None), None);
    }
}
