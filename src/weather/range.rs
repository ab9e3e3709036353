//! Time-range keywords shared by every read path.
//!
//! Relative keywords (`today`, `month=6`, ...) are evaluated against the
//! station's local calendar, then converted to UTC bounds. Bounds are
//! inclusive; a calendar period ends one microsecond before the next one starts.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::weather::reading::parse_instant;

/// Which readings a query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeSelection {
    /// The single most recent reading.
    Latest,
    /// The single oldest reading.
    First,
    /// Everything, oldest first.
    All,
    /// Inclusive range; a missing bound is open.
    Between {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl TimeSelection {
    /// Build a range from explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` when `end` is before `start`.
    pub fn between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> AppResult<Self> {
        if let (Some(s), Some(e)) = (start, end)
            && e < s
        {
            return Err(AppError::BadRequest(
                "end time must not be before start time".to_string(),
            ));
        }
        Ok(Self::Between { start, end })
    }

    #[must_use]
    pub fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self {
            Self::Between { start, end } => (*start, *end),
            _ => (None, None),
        }
    }
}

/// Parse a range keyword relative to `now`.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for unknown keywords and out-of-range numbers.
pub fn parse_range(arg: &str, now: DateTime<Utc>, tz: Tz) -> AppResult<TimeSelection> {
    let arg = arg.trim();
    let local_now = now.with_timezone(&tz);
    let today = local_now.date_naive();

    let selection = match arg {
        "latest" => TimeSelection::Latest,
        "first" => TimeSelection::First,
        "all" => TimeSelection::All,
        "today" => day_range(today, tz),
        "yesterday" => day_range(today - Duration::days(1), tz),
        "last24h" => closed(now - Duration::hours(24), now),
        "last7days" => closed(now - Duration::days(7), now),
        "week" => {
            let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
            period(monday, monday + Duration::days(7), tz)
        }
        "month" => month_range(today.year(), today.month(), tz)?,
        "year" => year_range(today.year(), tz)?,
        _ if arg.contains('/') => iso_interval(arg)?,
        _ if arg.contains('=') => keyed_range(arg, today, tz)?,
        _ => {
            return Err(AppError::BadRequest(format!(
                "Unknown date range argument: {arg}"
            )));
        }
    };
    Ok(selection)
}

/// Resolve a request's time selection.
///
/// `range` wins when present; otherwise explicit `start`/`end` bounds are
/// used; with neither, the latest reading is selected.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an unparseable keyword or bound, or
/// when `end` is before `start`.
pub fn resolve(
    range: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
    now: DateTime<Utc>,
    tz: Tz,
) -> AppResult<TimeSelection> {
    fn present(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|s| !s.is_empty())
    }

    if let Some(range) = present(range) {
        return parse_range(range, now, tz);
    }
    let start = present(start).map(|s| parse_bound(s, false, tz)).transpose()?;
    let end = present(end).map(|s| parse_bound(s, true, tz)).transpose()?;
    if start.is_none() && end.is_none() {
        return Ok(TimeSelection::Latest);
    }
    TimeSelection::between(start, end)
}

/// Parse one bound: an instant, or a local calendar date. A date used as an
/// end bound covers the whole of that day.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when the text is neither.
pub fn parse_bound(text: &str, is_end: bool, tz: Tz) -> AppResult<DateTime<Utc>> {
    if let Some(instant) = parse_instant(text) {
        return Ok(instant);
    }
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(format!(
            "Invalid {} time: {text}",
            if is_end { "end" } else { "start" }
        ))
    })?;
    Ok(if is_end {
        local_midnight(date + Duration::days(1), tz) - Duration::microseconds(1)
    } else {
        local_midnight(date, tz)
    })
}

fn keyed_range(arg: &str, today: NaiveDate, tz: Tz) -> AppResult<TimeSelection> {
    let invalid = || AppError::BadRequest(format!("Invalid date range argument format: {arg}"));

    let (key, value) = arg.split_once('=').ok_or_else(invalid)?;
    let value: i32 = value.trim().parse().map_err(|_| invalid())?;
    let year = today.year();

    match key.trim() {
        "day" => {
            if !(1..=366).contains(&value) {
                return Err(AppError::BadRequest(format!(
                    "Day number {value} out of range (1-366)."
                )));
            }
            let jan1 = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
            Ok(day_range(jan1 + Duration::days(i64::from(value - 1)), tz))
        }
        "week" => {
            if !(1..=53).contains(&value) {
                return Err(AppError::BadRequest(format!(
                    "Week number {value} out of range (1-53)."
                )));
            }
            // ISO week 1 is the week containing 4 January
            let jan4 = NaiveDate::from_ymd_opt(year, 1, 4).ok_or_else(invalid)?;
            let first_monday =
                jan4 - Duration::days(i64::from(jan4.weekday().num_days_from_monday()));
            let monday = first_monday + Duration::weeks(i64::from(value - 1));
            Ok(period(monday, monday + Duration::days(7), tz))
        }
        "month" => {
            if !(1..=12).contains(&value) {
                return Err(AppError::BadRequest(format!(
                    "Month number {value} out of range (1-12)."
                )));
            }
            month_range(year, value.unsigned_abs(), tz)
        }
        "year" => {
            if !(year - 100..=year + 100).contains(&value) {
                return Err(AppError::BadRequest(format!(
                    "Year {value} is far out of typical range."
                )));
            }
            year_range(value, tz)
        }
        other => Err(AppError::BadRequest(format!(
            "Unknown date range key: {other}"
        ))),
    }
}

fn iso_interval(arg: &str) -> AppResult<TimeSelection> {
    let invalid = || AppError::BadRequest(format!("Invalid ISO-8601 interval: {arg}"));
    let (start, end) = arg.split_once('/').ok_or_else(invalid)?;
    let start = parse_instant(start).ok_or_else(invalid)?;
    let end = parse_instant(end).ok_or_else(invalid)?;
    TimeSelection::between(Some(start), Some(end))
}

fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeSelection {
    TimeSelection::Between {
        start: Some(start),
        end: Some(end),
    }
}

/// `[first, next)` in local calendar days, expressed as an inclusive UTC range.
fn period(first: NaiveDate, next: NaiveDate, tz: Tz) -> TimeSelection {
    closed(
        local_midnight(first, tz),
        local_midnight(next, tz) - Duration::microseconds(1),
    )
}

fn day_range(day: NaiveDate, tz: Tz) -> TimeSelection {
    period(day, day + Duration::days(1), tz)
}

fn month_range(year: i32, month: u32, tz: Tz) -> AppResult<TimeSelection> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid month: {year}-{month}")))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| AppError::BadRequest(format!("Invalid month: {year}-{month}")))?;
    Ok(period(first, next, tz))
}

fn year_range(year: i32, tz: Tz) -> AppResult<TimeSelection> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid year: {year}")))?;
    let next = NaiveDate::from_ymd_opt(year + 1, 1, 1)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid year: {year}")))?;
    Ok(period(first, next, tz))
}

/// Start of a local calendar day as a UTC instant.
///
/// Where midnight falls in a DST gap, the first valid local instant after it is used.
#[must_use]
pub fn local_midnight(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest(),
    };
    local.map_or_else(|| naive.and_utc(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::London;

    // Wednesday 2025-06-18 13:45 UTC (14:45 BST)
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 18, 13, 45, 0).unwrap()
    }

    fn bounds(arg: &str) -> (DateTime<Utc>, DateTime<Utc>) {
        match parse_range(arg, now(), London).unwrap() {
            TimeSelection::Between {
                start: Some(s),
                end: Some(e),
            } => (s, e),
            other => panic!("expected closed range for {arg}, got {other:?}"),
        }
    }

    #[test]
    fn special_keywords() {
        assert_eq!(parse_range("latest", now(), London).unwrap(), TimeSelection::Latest);
        assert_eq!(parse_range("first", now(), London).unwrap(), TimeSelection::First);
        assert_eq!(parse_range("all", now(), London).unwrap(), TimeSelection::All);
    }

    #[test]
    fn today_follows_local_calendar() {
        let (start, end) = bounds("today");
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 17, 23, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2025, 6, 18, 23, 0, 0).unwrap() - Duration::microseconds(1)
        );
    }

    #[test]
    fn rolling_windows_end_now() {
        let (start, end) = bounds("last24h");
        assert_eq!(end, now());
        assert_eq!(end - start, Duration::hours(24));
        let (start, _) = bounds("last7days");
        assert_eq!(now() - start, Duration::days(7));
    }

    #[test]
    fn week_starts_on_monday() {
        let (start, _) = bounds("week");
        // Monday 16 June, local midnight
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 15, 23, 0, 0).unwrap());
    }

    #[test]
    fn keyed_ranges() {
        let (start, end) = bounds("month=1");
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap() - Duration::microseconds(1)
        );

        let (start, _) = bounds("day=32");
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());

        // ISO week 1 of 2025 starts Monday 30 December 2024
        let (start, _) = bounds("week=1");
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 30, 0, 0, 0).unwrap());

        let (start, _) = bounds("year=2024");
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn iso_interval_bounds() {
        let (start, end) = bounds("2025-01-01T00:00Z/2025-02-01T00:00Z");
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        assert!(parse_range("2025-02-01T00:00Z/2025-01-01T00:00Z", now(), London).is_err());
    }

    #[test]
    fn resolve_prefers_range_then_bounds() {
        assert_eq!(resolve(None, None, None, now(), London).unwrap(), TimeSelection::Latest);
        assert_eq!(resolve(Some(" "), Some(""), None, now(), London).unwrap(), TimeSelection::Latest);
        assert_eq!(
            resolve(Some("all"), Some("999"), None, now(), London).unwrap(),
            TimeSelection::All
        );

        let selection = resolve(None, Some("999"), Some("1001"), now(), London).unwrap();
        assert_eq!(
            selection.bounds(),
            (
                Some(Utc.timestamp_opt(999, 0).unwrap()),
                Some(Utc.timestamp_opt(1001, 0).unwrap())
            )
        );

        assert!(resolve(None, Some("1001"), Some("999"), now(), London).is_err());
        assert!(resolve(None, Some("soon"), None, now(), London).is_err());
    }

    #[test]
    fn date_only_end_covers_the_day() {
        let end = parse_bound("2025-01-10", true, London).unwrap();
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2025, 1, 11, 0, 0, 0).unwrap() - Duration::microseconds(1)
        );
        let start = parse_bound("2025-07-10", false, London).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 7, 9, 23, 0, 0).unwrap());
    }

    #[test]
    fn rejects_bad_arguments() {
        for arg in ["tomorrow", "day=0", "week=54", "month=13", "year=1800", "hour=3", "month=x"] {
            assert!(
                matches!(parse_range(arg, now(), London), Err(AppError::BadRequest(_))),
                "{arg} should be rejected"
            );
        }
    }
}
