//! Occurrence arithmetic on civil dates.
//!
//! Everything here is pure: a rule plus an anchor date in, dates out. A
//! `None` result means the series has nothing left to produce, either
//! because the rule does not repeat, its end date has passed, or the date
//! would leave the supported calendar range.

use crate::model::rule::LAST_WEEK_OF_MONTH;
use crate::model::{RecurrenceKind, RecurrenceRule};
use std::collections::BTreeSet;
use time::{Date, Duration, Month};

/// Upper bound on how many steps a catch-up walk may take.
const MAX_CATCH_UP_STEPS: usize = 100_000;

/// Next date strictly after `anchor`, or `None` once the rule is exhausted.
pub fn next_occurrence(rule: &RecurrenceRule, anchor: Date) -> Option<Date> {
    let interval = rule.effective_interval();
    let candidate = match rule.kind {
        RecurrenceKind::None => return None,
        RecurrenceKind::Daily => add_days(anchor, i64::from(interval))?,
        RecurrenceKind::Weekly => next_weekly(rule, anchor, interval)?,
        RecurrenceKind::Monthly => {
            let (year, month) = shift_month(anchor, interval)?;
            let day = rule.month_day.unwrap_or(anchor.day());
            clamped_date(year, month, day)?
        }
        RecurrenceKind::MonthlyWeekday => {
            let (year, month) = shift_month(anchor, interval)?;
            nth_weekday_of_month(year, month, rule.week_of_month?, rule.weekday?)?
        }
        RecurrenceKind::MonthlyLastDay => {
            let (year, month) = shift_month(anchor, interval)?;
            Date::from_calendar_date(year, month, days_in_month(year, month)).ok()?
        }
    };

    if let Some(end_date) = rule.end_date
        && candidate > end_date
    {
        return None;
    }

    Some(candidate)
}

/// Lazily walks a series forward from `seed`, one occurrence at a time.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    rule: &'a RecurrenceRule,
    cursor: Option<Date>,
}

impl Iterator for Occurrences<'_> {
    type Item = Date;

    fn next(&mut self) -> Option<Date> {
        let next = next_occurrence(self.rule, self.cursor?);
        self.cursor = next;
        next
    }
}

pub fn occurrences(rule: &RecurrenceRule, seed: Date) -> Occurrences<'_> {
    Occurrences {
        rule,
        cursor: Some(seed),
    }
}

/// Up to `n` occurrences. With `start_from` they follow that date.
/// Otherwise they follow `anchor`, and when `anchor` lies in the past the
/// series is walked forward from it so only dates after `today` are kept
/// while the series keeps its phase.
pub fn next_n_occurrences(
    rule: &RecurrenceRule,
    anchor: Date,
    n: usize,
    start_from: Option<Date>,
    today: Date,
) -> Vec<Date> {
    match start_from {
        Some(seed) => occurrences(rule, seed).take(n).collect(),
        None if anchor >= today => occurrences(rule, anchor).take(n).collect(),
        None => occurrences(rule, anchor)
            .take(MAX_CATCH_UP_STEPS)
            .skip_while(|date| *date <= today)
            .take(n)
            .collect(),
    }
}

/// First occurrence after `anchor` that falls on or after `floor`.
pub fn first_occurrence_on_or_after(
    rule: &RecurrenceRule,
    anchor: Date,
    floor: Date,
) -> Option<Date> {
    occurrences(rule, anchor)
        .take(MAX_CATCH_UP_STEPS)
        .find(|date| *date >= floor)
}

fn next_weekly(rule: &RecurrenceRule, anchor: Date, interval: u32) -> Option<Date> {
    let days: BTreeSet<u8> = if rule.weekdays.is_empty() {
        rule.weekday.into_iter().filter(|day| *day <= 6).collect()
    } else {
        rule.weekdays.iter().copied().filter(|day| *day <= 6).collect()
    };
    let block = 7 * i64::from(interval);

    let Some(first_day) = days.first().copied() else {
        return add_days(anchor, block);
    };

    let anchor_day = weekday_number(anchor);
    if let Some(day) = days.iter().find(|day| **day > anchor_day) {
        return add_days(anchor, i64::from(day - anchor_day));
    }

    // Set exhausted for this week: jump to the first matching day of the
    // week `interval` weeks after this week's Sunday.
    let week_start = add_days(anchor, -i64::from(anchor_day))?;
    add_days(week_start, block + i64::from(first_day))
}

fn nth_weekday_of_month(year: i32, month: Month, week: u8, weekday: u8) -> Option<Date> {
    if weekday > 6 || week == 0 {
        return None;
    }

    let month_length = days_in_month(year, month);
    let first = Date::from_calendar_date(year, month, 1).ok()?;
    let offset = (weekday + 7 - weekday_number(first)) % 7;
    let nth = 1 + offset + (week.min(LAST_WEEK_OF_MONTH) - 1) * 7;

    if week < LAST_WEEK_OF_MONTH && nth <= month_length {
        return Date::from_calendar_date(year, month, nth).ok();
    }

    let last = Date::from_calendar_date(year, month, month_length).ok()?;
    let back = (weekday_number(last) + 7 - weekday) % 7;
    Date::from_calendar_date(year, month, month_length - back).ok()
}

/// 0 = Sunday .. 6 = Saturday.
pub fn weekday_number(date: Date) -> u8 {
    date.weekday().number_days_from_sunday()
}

pub fn days_in_month(year: i32, month: Month) -> u8 {
    match month {
        Month::February if time::util::is_leap_year(year) => 29,
        Month::February => 28,
        Month::April | Month::June | Month::September | Month::November => 30,
        _ => 31,
    }
}

fn add_days(date: Date, days: i64) -> Option<Date> {
    date.checked_add(Duration::days(days))
}

fn shift_month(anchor: Date, months: u32) -> Option<(i32, Month)> {
    let index = i64::from(anchor.year()) * 12 + i64::from(u8::from(anchor.month())) - 1;
    let shifted = index.checked_add(i64::from(months))?;
    let year = i32::try_from(shifted.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(shifted.rem_euclid(12) + 1).ok()?).ok()?;
    Some((year, month))
}

/// Day clamped into the month, so day 31 in a 30-day month is the 30th and
/// never the 1st of the following month.
fn clamped_date(year: i32, month: Month, day: u8) -> Option<Date> {
    let day = day.clamp(1, days_in_month(year, month));
    Date::from_calendar_date(year, month, day).ok()
}
