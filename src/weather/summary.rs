//! Figures for the static dashboard: latest conditions, per-period extremes
//! and the rainy-day count for the year.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::entity::readings;
use crate::error::AppResult;
use crate::weather::fields::{Field, compass16, round1};
use crate::weather::range::{TimeSelection, local_midnight, parse_range};
use crate::weather::stats;

/// A local day counts as rainy above this total, in mm.
pub const RAINY_DAY_THRESHOLD_MM: f64 = 1.0;

/// Periods shown on the dashboard, in display order.
pub const PERIODS: [(&str, &str); 5] = [
    ("today", "Today"),
    ("yesterday", "Yesterday"),
    ("week", "This week"),
    ("month", "This month"),
    ("year", "This year"),
];

#[derive(Debug, Clone, Serialize)]
pub struct LatestConditions {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// Local time, e.g. `Tuesday at 14:05`.
    pub local_time: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
    pub rain_rate_mm_per_hour: Option<f64>,
    pub luminance: Option<f64>,
    pub wind_speed_mph: Option<f64>,
    pub wind_direction: Option<f64>,
    pub compass: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    pub key: &'static str,
    pub title: &'static str,
    pub readings: usize,
    pub max_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub total_rain: Option<f64>,
    pub max_rain_rate: Option<f64>,
    pub max_wind_speed: Option<f64>,
    pub avg_pressure: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RainyDays {
    pub rainy: usize,
    pub days_with_data: usize,
}

impl RainyDays {
    #[must_use]
    pub fn percent(&self) -> Option<usize> {
        (self.days_with_data > 0).then(|| (100 * self.rainy + self.days_with_data / 2) / self.days_with_data)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub generated_at: DateTime<Utc>,
    pub latest: Option<LatestConditions>,
    pub periods: Vec<PeriodSummary>,
    pub rainy_days: RainyDays,
}

/// Earliest instant any dashboard period reaches back to.
///
/// The current week can start in the previous year, so this is the earlier of
/// the start of the week and the start of the year.
///
/// # Errors
///
/// Propagates range errors, which only occur for out-of-calendar dates.
pub fn window_start(now: DateTime<Utc>, tz: Tz) -> AppResult<DateTime<Utc>> {
    let mut earliest = now;
    for (key, _) in PERIODS {
        if let (Some(start), _) = parse_range(key, now, tz)?.bounds() {
            earliest = earliest.min(start);
        }
    }
    Ok(earliest)
}

/// Summarise readings that cover at least `window_start(now, tz)..=now`.
///
/// # Errors
///
/// Propagates range errors, which only occur for out-of-calendar dates.
pub fn summarize(
    latest: Option<&readings::Model>,
    window: &[readings::Model],
    now: DateTime<Utc>,
    tz: Tz,
) -> AppResult<DashboardSummary> {
    let mut periods = Vec::with_capacity(PERIODS.len());
    for (key, title) in PERIODS {
        let selection = parse_range(key, now, tz)?;
        let rows: Vec<&readings::Model> = window.iter().filter(|r| selection_contains(&selection, r.timestamp)).collect();
        periods.push(period_summary(key, title, &rows));
    }

    let year_start = local_midnight(
        NaiveDate::from_ymd_opt(now.with_timezone(&tz).year(), 1, 1).unwrap_or_default(),
        tz,
    );
    let this_year: Vec<&readings::Model> = window.iter().filter(|r| r.timestamp >= year_start).collect();

    Ok(DashboardSummary {
        generated_at: now,
        latest: latest.map(|r| latest_conditions(r, tz)),
        periods,
        rainy_days: rainy_days(&this_year, tz),
    })
}

fn selection_contains(selection: &TimeSelection, ts: DateTime<Utc>) -> bool {
    let (start, end) = selection.bounds();
    start.is_none_or(|s| ts >= s) && end.is_none_or(|e| ts <= e)
}

fn latest_conditions(reading: &readings::Model, tz: Tz) -> LatestConditions {
    let display = |field: Field| field.display_value(reading).map(round1);
    LatestConditions {
        device_id: reading.device_id.clone(),
        timestamp: reading.timestamp,
        local_time: reading
            .timestamp
            .with_timezone(&tz)
            .format("%A at %H:%M")
            .to_string(),
        temperature: round1(reading.temperature),
        humidity: round1(reading.humidity),
        pressure: display(Field::Pressure),
        rain_rate_mm_per_hour: display(Field::RainRate),
        luminance: display(Field::Luminance),
        wind_speed_mph: display(Field::WindSpeed),
        wind_direction: reading.wind_direction,
        compass: reading.wind_direction.map(compass16),
    }
}

fn column(rows: &[&readings::Model], field: Field) -> Vec<f64> {
    rows.iter().filter_map(|r| field.display_value(r)).collect()
}

fn period_summary(key: &'static str, title: &'static str, rows: &[&readings::Model]) -> PeriodSummary {
    let temperature = column(rows, Field::Temperature);
    PeriodSummary {
        key,
        title,
        readings: rows.len(),
        max_temperature: stats::max(&temperature).map(round1),
        min_temperature: stats::min(&temperature).map(round1),
        total_rain: stats::sum(&column(rows, Field::Rain)).map(round1),
        max_rain_rate: stats::max(&column(rows, Field::RainRate)).map(round1),
        max_wind_speed: stats::max(&column(rows, Field::WindSpeed)).map(round1),
        avg_pressure: stats::mean(&column(rows, Field::Pressure)).map(round1),
    }
}

/// Daily rain totals per local date.
pub(crate) fn daily_rain(rows: &[&readings::Model], tz: Tz) -> BTreeMap<NaiveDate, f64> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for r in rows {
        let total = days
            .entry(r.timestamp.with_timezone(&tz).date_naive())
            .or_default();
        *total += r.rain.unwrap_or(0.0);
    }
    days
}

pub(crate) fn rainy_days(rows: &[&readings::Model], tz: Tz) -> RainyDays {
    let days = daily_rain(rows, tz);
    RainyDays {
        rainy: days.values().filter(|mm| **mm > RAINY_DAY_THRESHOLD_MM).count(),
        days_with_data: days.len(),
    }
}
