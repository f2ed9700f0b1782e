// src/schedule_parser.rs
//
// Rule-based extraction of a due date and time from a free-text task prompt.
// The result is advisory input for the downstream task extractor, so this
// module never fails: every rule degrades to a fixed default and the caller
// always gets a concrete moment back.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

// Index 0 = Sunday, matching Weekday::num_days_from_sunday.
const WEEKDAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

// Per month: "<day>(st|nd|rd|th)? (of )?<month>" and "<month> <day>(st|nd|rd|th)?".
static MONTH_DAY_PATTERNS: Lazy<Vec<(Regex, Regex)>> = Lazy::new(|| {
    MONTH_NAMES
        .iter()
        .map(|month| {
            let day_first = Regex::new(&format!(
                r"(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{}",
                month
            ))
            .expect("month-day pattern is valid");
            let month_first = Regex::new(&format!(r"{}\s+(\d{{1,2}})(?:st|nd|rd|th)?", month))
                .expect("month-day pattern is valid");
            (day_first, month_first)
        })
        .collect()
});

static IN_DAYS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"in\s+(\d+)\s+days?").expect("in-days pattern is valid"));

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})(?::(\d{2}))?\s*(am|pm)?").expect("time pattern is valid"));

/// Best-effort due moment extracted from a prompt. Date and time are wall
/// clock in whatever zone the caller's `now` was expressed in; no zone is
/// attached here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueMoment {
    pub date: NaiveDate,
    pub hour: u32,
    pub minute: u32,
}

impl DueMoment {
    /// The combined moment with seconds zeroed.
    pub fn as_datetime(&self) -> NaiveDateTime {
        self.date
            .and_hms_opt(self.hour, self.minute, 0)
            .unwrap_or_else(|| self.date.and_time(NaiveTime::MIN))
    }
}

/// Parse a free-text prompt into a concrete due date and time.
///
/// Matching is case-insensitive (the prompt is folded to lowercase first).
/// Date and time resolve independently; an unparseable prompt comes back as
/// `now + 1 day` at 12:00.
pub fn parse_due_moment(prompt: &str, now: NaiveDateTime) -> DueMoment {
    let normalized = prompt.to_lowercase();
    let date = resolve_date(&normalized, now);
    let (hour, minute) = resolve_time(&normalized);
    debug!(
        "Parsed due moment from prompt: date={}, time={:02}:{:02}",
        date, hour, minute
    );
    DueMoment { date, hour, minute }
}

// --- Date Resolution ---

// Rules in priority order, first match wins. Fallback is "tomorrow".
fn resolve_date(prompt: &str, now: NaiveDateTime) -> NaiveDate {
    if let Some(date) = match_month_day(prompt, now) {
        return date;
    }
    if let Some(date) = match_next_weekday(prompt, now) {
        return date;
    }
    if let Some(date) = match_relative_keyword(prompt, now) {
        return date;
    }
    now.date() + Duration::days(1)
}

// Months are tried in calendar order; the first month name that produces a
// regex match wins, with no attempt to rank matches across months.
fn match_month_day(prompt: &str, now: NaiveDateTime) -> Option<NaiveDate> {
    for (month_index, (day_first, month_first)) in MONTH_DAY_PATTERNS.iter().enumerate() {
        let caps = day_first
            .captures(prompt)
            .or_else(|| month_first.captures(prompt));
        let Some(caps) = caps else { continue };
        let Ok(day) = caps[1].parse::<u32>() else {
            continue;
        };
        let month = month_index as u32 + 1;
        if let Some(date) = month_day_with_year_rollover(now, month, day) {
            return Some(date);
        }
        // A day that is not a real calendar date for this month (or for the
        // rolled-over year) is treated as no match; resolution continues.
    }
    None
}

// "26th of January" said in November means the coming January: a constructed
// date whose midnight lies strictly before `now` advances one year.
fn month_day_with_year_rollover(now: NaiveDateTime, month: u32, day: u32) -> Option<NaiveDate> {
    let candidate = NaiveDate::from_ymd_opt(now.date().year(), month, day)?;
    if candidate.and_time(NaiveTime::MIN) < now {
        NaiveDate::from_ymd_opt(now.date().year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

fn match_next_weekday(prompt: &str, now: NaiveDateTime) -> Option<NaiveDate> {
    for (target, name) in WEEKDAY_NAMES.iter().enumerate() {
        if !prompt.contains(&format!("next {}", name)) {
            continue;
        }
        let current = i64::from(now.date().weekday().num_days_from_sunday());
        let mut offset = (target as i64 - current + 7) % 7;
        if offset == 0 {
            // "next Monday" said on a Monday is a week out, never today.
            offset = 7;
        }
        return Some(now.date() + Duration::days(offset));
    }
    None
}

fn match_relative_keyword(prompt: &str, now: NaiveDateTime) -> Option<NaiveDate> {
    if prompt.contains("tomorrow") {
        return Some(now.date() + Duration::days(1));
    }
    if prompt.contains("today") {
        return Some(now.date());
    }
    if prompt.contains("next week") {
        return Some(now.date() + Duration::days(7));
    }
    if prompt.contains("next month") {
        // Months::checked_add clamps the day when the target month is shorter.
        return now.date().checked_add_months(Months::new(1));
    }
    if let Some(caps) = IN_DAYS_RE.captures(prompt) {
        if let Ok(n) = caps[1].parse::<i64>() {
            return now.date().checked_add_signed(Duration::days(n));
        }
    }
    None
}

// --- Time Resolution ---

// First number in the prompt is taken as the time-of-day. Minutes default to
// zero. 12-hour conversion happens only when an am/pm suffix is present; a
// bare hour passes through unmodified ("15:00" stays 15:00, a bare "3" stays
// hour 3). No match, or a captured value outside the clock range, defaults
// to noon.
fn resolve_time(prompt: &str) -> (u32, u32) {
    let Some(caps) = TIME_RE.captures(prompt) else {
        return (12, 0);
    };
    let Ok(mut hour) = caps[1].parse::<u32>() else {
        return (12, 0);
    };
    let minute = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0);
    match caps.get(3).map(|m| m.as_str()) {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return (12, 0);
    }
    (hour, minute)
}

// --- Test Module ---
#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|_| panic!("Invalid datetime string format: {}", s))
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", s))
    }

    #[test]
    fn unparseable_prompt_defaults_to_tomorrow_noon() {
        let result = parse_due_moment("ship the quarterly deck", ts("2025-11-10 08:15:00"));
        assert_eq!(result.date, d("2025-11-11"));
        assert_eq!((result.hour, result.minute), (12, 0));
        assert_eq!(result.as_datetime(), ts("2025-11-11 12:00:00"));
    }

    #[test]
    fn month_day_in_future_keeps_current_year() {
        let result = parse_due_moment("prepare the audit by 26th of december", ts("2025-11-10 08:00:00"));
        assert_eq!(result.date, d("2025-12-26"));
    }

    #[test]
    fn month_day_in_past_rolls_to_next_year() {
        let result = parse_due_moment("prepare the audit by 26th of january", ts("2025-11-10 08:00:00"));
        assert_eq!(result.date, d("2026-01-26"));
    }

    #[test]
    fn month_first_form_matches() {
        let result = parse_due_moment("review on december 3", ts("2025-11-10 08:00:00"));
        assert_eq!(result.date, d("2025-12-03"));
        // "3" is also the first number in the prompt, so it doubles as the hour.
        assert_eq!((result.hour, result.minute), (3, 0));
    }

    #[test]
    fn ordinal_suffix_without_of_matches() {
        let result = parse_due_moment("due 3rd june", ts("2025-01-15 08:00:00"));
        assert_eq!(result.date, d("2025-06-03"));
    }

    #[test]
    fn earliest_month_name_wins_over_position_in_prompt() {
        // June appears first in the prompt, but months are scanned in
        // calendar order, so the January pattern is found first.
        let result = parse_due_moment(
            "either 15 june or 20 january works",
            ts("2025-11-10 08:00:00"),
        );
        assert_eq!(result.date, d("2026-01-20"));
    }

    #[test]
    fn impossible_day_falls_through_to_later_rules() {
        // February 31st is not a date; resolution continues and lands on the
        // "tomorrow" fallback.
        let result = parse_due_moment("due 31st of february", ts("2025-11-10 08:00:00"));
        assert_eq!(result.date, d("2025-11-11"));
    }

    #[test]
    fn next_weekday_on_same_weekday_is_a_full_week_out() {
        // 2025-11-10 is a Monday.
        let result = parse_due_moment("sync next monday", ts("2025-11-10 09:00:00"));
        assert_eq!(result.date, d("2025-11-17"));
    }

    #[test]
    fn next_weekday_uses_forward_offset() {
        // Monday -> next Friday is four days ahead.
        let result = parse_due_moment("demo next friday", ts("2025-11-10 09:00:00"));
        assert_eq!(result.date, d("2025-11-14"));
    }

    #[test]
    fn tomorrow_and_today_keywords() {
        let now = ts("2025-11-10 09:00:00");
        assert_eq!(parse_due_moment("finish this tomorrow", now).date, d("2025-11-11"));
        assert_eq!(parse_due_moment("finish this today", now).date, d("2025-11-10"));
    }

    #[test]
    fn next_week_adds_seven_days() {
        let result = parse_due_moment("circle back next week", ts("2025-11-10 09:00:00"));
        assert_eq!(result.date, d("2025-11-17"));
    }

    #[test]
    fn next_month_clamps_day_of_month() {
        let result = parse_due_moment("invoice run next month", ts("2025-01-31 09:00:00"));
        assert_eq!(result.date, d("2025-02-28"));
    }

    #[test]
    fn in_n_days_adds_captured_count() {
        let result = parse_due_moment("follow up in 5 days", ts("2025-11-10 09:00:00"));
        assert_eq!(result.date, d("2025-11-15"));
        // The captured "5" is also the first number, so it becomes the hour.
        assert_eq!((result.hour, result.minute), (5, 0));
    }

    #[test]
    fn pm_suffix_converts_to_24_hour() {
        let result = parse_due_moment("call the vendor at 3pm", ts("2025-11-10 09:00:00"));
        assert_eq!((result.hour, result.minute), (15, 0));
    }

    #[test]
    fn bare_hour_is_passed_through_unmodified() {
        let result = parse_due_moment("call the vendor at 3", ts("2025-11-10 09:00:00"));
        assert_eq!((result.hour, result.minute), (3, 0));
    }

    #[test]
    fn bare_24_hour_time_is_literal() {
        let result = parse_due_moment("standup at 15:45", ts("2025-11-10 09:00:00"));
        assert_eq!((result.hour, result.minute), (15, 45));
    }

    #[test]
    fn twelve_am_maps_to_midnight() {
        let result = parse_due_moment("batch job at 12:30 am", ts("2025-11-10 09:00:00"));
        assert_eq!((result.hour, result.minute), (0, 30));
    }

    #[test]
    fn twelve_pm_stays_noon() {
        let result = parse_due_moment("lunch sync 12pm", ts("2025-11-10 09:00:00"));
        assert_eq!((result.hour, result.minute), (12, 0));
    }

    #[test]
    fn minutes_with_pm_suffix() {
        let result = parse_due_moment("review at 3:45pm", ts("2025-11-10 09:00:00"));
        assert_eq!((result.hour, result.minute), (15, 45));
    }

    #[test]
    fn out_of_range_hour_defaults_to_noon() {
        // The day-of-month is the first number the time scan sees; 26 is not
        // a clock hour, so the time degrades to the noon default.
        let result = parse_due_moment("due 26th of january", ts("2025-11-10 09:00:00"));
        assert_eq!(result.date, d("2026-01-26"));
        assert_eq!((result.hour, result.minute), (12, 0));
    }

    #[test]
    fn date_and_time_combine_with_seconds_zeroed() {
        let result = parse_due_moment("report due tomorrow at 9:15am", ts("2025-11-10 17:30:44"));
        assert_eq!(result.as_datetime(), ts("2025-11-11 09:15:00"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let result = parse_due_moment("Due 26th Of January At 3PM", ts("2025-11-10 09:00:00"));
        assert_eq!(result.date, d("2026-01-26"));
        // "26" is scanned before "3", and 26 is out of clock range.
        assert_eq!((result.hour, result.minute), (12, 0));
    }
}
