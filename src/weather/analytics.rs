//! Aggregations behind the interactive analytics page.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::readings;
use crate::weather::fields::{Field, compass8, round1};
use crate::weather::stats;
use crate::weather::summary::{daily_rain, rainy_days};

/// Bucket size chosen from the span of the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    #[must_use]
    pub fn for_span(span: Duration) -> Self {
        if span <= Duration::days(2) {
            Self::Hour
        } else if span <= Duration::days(14) {
            Self::Day
        } else if span <= Duration::days(92) {
            Self::Week
        } else {
            Self::Month
        }
    }

    /// Moving-average window, in samples (readings arrive every 15 minutes).
    #[must_use]
    pub fn rolling_window(self) -> usize {
        match self {
            Self::Hour => 4,
            Self::Day => 96,
            Self::Week => 7 * 96,
            Self::Month => 30 * 96,
        }
    }

    /// Local start of the bucket holding `ts`.
    #[must_use]
    pub fn bucket(self, ts: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
        let local = ts.with_timezone(&tz).naive_local();
        let date = local.date();
        match self {
            Self::Hour => date.and_time(NaiveTime::from_hms_opt(local.hour(), 0, 0).unwrap_or(NaiveTime::MIN)),
            Self::Day => date.and_time(NaiveTime::MIN),
            Self::Week => {
                let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                monday.and_time(NaiveTime::MIN)
            }
            Self::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                .unwrap_or(date)
                .and_time(NaiveTime::MIN),
        }
    }

    #[must_use]
    pub fn label(self, bucket: NaiveDateTime) -> String {
        let pattern = match self {
            Self::Hour => "%Y-%m-%d %H:00",
            Self::Day => "%Y-%m-%d",
            Self::Week => "w/c %Y-%m-%d",
            Self::Month => "%Y-%m",
        };
        bucket.format(pattern).to_string()
    }
}

/// Per-period temperature statistic shown in the bar chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TempStat {
    Min,
    Max,
    #[default]
    Median,
}

impl TempStat {
    fn apply(self, values: &[f64]) -> Option<f64> {
        match self {
            Self::Min => stats::min(values),
            Self::Max => stats::max(values),
            Self::Median => stats::median(values),
        }
    }
}

/// Counts of readings per eight-point compass direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[allow(non_snake_case)]
pub struct WindRose {
    pub N: u64,
    pub NE: u64,
    pub E: u64,
    pub SE: u64,
    pub S: u64,
    pub SW: u64,
    pub W: u64,
    pub NW: u64,
}

impl WindRose {
    fn add(&mut self, degrees: f64) {
        let slot = match compass8(degrees) {
            "N" => &mut self.N,
            "NE" => &mut self.NE,
            "E" => &mut self.E,
            "SE" => &mut self.SE,
            "S" => &mut self.S,
            "SW" => &mut self.SW,
            "W" => &mut self.W,
            _ => &mut self.NW,
        };
        *slot += 1;
    }
}

/// Whole-selection statistics. All `None` when the selection is empty.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct OverallStatistics {
    pub median_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub total_rainfall: Option<f64>,
    pub max_daily_rainfall: Option<f64>,
    /// mm/hr
    pub max_rain_rate: Option<f64>,
    /// `rainy/days`, e.g. `3/14`
    pub rainy_days: Option<String>,
    /// mph
    pub max_wind_speed: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PeriodStatistics {
    pub period: String,
    pub median_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub total_rainfall: Option<f64>,
    pub max_rain_rate: Option<f64>,
    pub max_wind_speed: Option<f64>,
    pub avg_luminance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BoxplotEntry {
    pub period: String,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Chosen field over time, in display units.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct Series {
    pub times: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
    pub rolling_average: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalyticsReport {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub granularity: Granularity,
    pub field: Field,
    pub unit: &'static str,
    pub temp_stat: TempStat,
    pub periods: Vec<String>,
    pub temperature: Vec<Option<f64>>,
    pub rainfall: Vec<f64>,
    pub wind_rose: WindRose,
    pub statistics: OverallStatistics,
    pub period_statistics: Vec<PeriodStatistics>,
    pub series: Series,
    pub boxplot: Vec<BoxplotEntry>,
}

/// Build the analytics report for readings already ordered by time.
///
/// `start` and `end` are the requested bounds; where open, the span of the
/// data decides the granularity.
#[must_use]
pub fn build_report(
    rows: &[readings::Model],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    field: Field,
    temp_stat: TempStat,
    tz: Tz,
) -> AnalyticsReport {
    let start = start.or_else(|| rows.first().map(|r| r.timestamp));
    let end = end.or_else(|| rows.last().map(|r| r.timestamp));
    let span = match (start, end) {
        (Some(s), Some(e)) => e - s,
        _ => Duration::zero(),
    };
    let granularity = Granularity::for_span(span);

    let mut buckets: BTreeMap<NaiveDateTime, Vec<&readings::Model>> = BTreeMap::new();
    for r in rows {
        buckets.entry(granularity.bucket(r.timestamp, tz)).or_default().push(r);
    }

    let mut report = AnalyticsReport {
        start,
        end,
        granularity,
        field,
        unit: field.display_unit(),
        temp_stat,
        periods: Vec::with_capacity(buckets.len()),
        temperature: Vec::with_capacity(buckets.len()),
        rainfall: Vec::with_capacity(buckets.len()),
        wind_rose: WindRose::default(),
        statistics: OverallStatistics::default(),
        period_statistics: Vec::with_capacity(buckets.len()),
        series: Series::default(),
        boxplot: Vec::new(),
    };

    for (bucket, members) in &buckets {
        let label = granularity.label(*bucket);
        let temperature = column(members, Field::Temperature);

        report.periods.push(label.clone());
        report.temperature.push(temp_stat.apply(&temperature).map(round1));
        report
            .rainfall
            .push(round1(stats::sum(&column(members, Field::Rain)).unwrap_or(0.0)));
        report.period_statistics.push(PeriodStatistics {
            period: label.clone(),
            median_temperature: stats::median(&temperature).map(round1),
            min_temperature: stats::min(&temperature).map(round1),
            max_temperature: stats::max(&temperature).map(round1),
            total_rainfall: stats::sum(&column(members, Field::Rain)).map(round1),
            max_rain_rate: stats::max(&column(members, Field::RainRate)).map(round1),
            max_wind_speed: stats::max(&column(members, Field::WindSpeed)).map(round1),
            avg_luminance: stats::mean(&column(members, Field::Luminance)).map(round1),
        });
        if let Some([min, q1, median, q3, max]) = stats::five_numbers(&column(members, field)) {
            report.boxplot.push(BoxplotEntry {
                period: label,
                min: round1(min),
                q1: round1(q1),
                median: round1(median),
                q3: round1(q3),
                max: round1(max),
            });
        }
    }

    for direction in rows.iter().filter_map(|r| r.wind_direction) {
        report.wind_rose.add(direction);
    }

    for r in rows {
        if let Some(value) = field.display_value(r) {
            report.series.times.push(r.timestamp);
            report.series.values.push(value);
        }
    }
    report.series.rolling_average = stats::rolling_mean(&report.series.values, granularity.rolling_window())
        .into_iter()
        .map(round1)
        .collect();

    if !rows.is_empty() {
        report.statistics = overall_statistics(rows, tz);
    }
    report
}

fn column(rows: &[&readings::Model], field: Field) -> Vec<f64> {
    rows.iter().filter_map(|r| field.display_value(r)).collect()
}

fn overall_statistics(rows: &[readings::Model], tz: Tz) -> OverallStatistics {
    let all: Vec<&readings::Model> = rows.iter().collect();
    let temperature = column(&all, Field::Temperature);
    let daily: Vec<f64> = daily_rain(&all, tz).into_values().collect();
    let rainy = rainy_days(&all, tz);

    OverallStatistics {
        median_temperature: stats::median(&temperature).map(round1),
        min_temperature: stats::min(&temperature).map(round1),
        max_temperature: stats::max(&temperature).map(round1),
        total_rainfall: stats::sum(&column(&all, Field::Rain)).map(round1),
        max_daily_rainfall: stats::max(&daily).map(round1),
        max_rain_rate: stats::max(&column(&all, Field::RainRate)).map(round1),
        rainy_days: Some(format!("{}/{}", rainy.rainy, rainy.days_with_data)),
        max_wind_speed: stats::max(&column(&all, Field::WindSpeed)).map(round1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::London;

    fn reading(ts: DateTime<Utc>, temperature: f64, rain: f64, wind_direction: f64) -> readings::Model {
        readings::Model {
            device_id: "pico-1".to_string(),
            timestamp: ts,
            temperature,
            humidity: 60.0,
            pressure: None,
            rain: Some(rain),
            rain_rate: Some(0.0005),
            luminance: Some(100.0),
            wind_speed: Some(5.0),
            wind_direction: Some(wind_direction),
            received_at: ts,
        }
    }

    #[test]
    fn granularity_thresholds() {
        assert_eq!(Granularity::for_span(Duration::hours(30)), Granularity::Hour);
        assert_eq!(Granularity::for_span(Duration::days(2)), Granularity::Hour);
        assert_eq!(Granularity::for_span(Duration::days(7)), Granularity::Day);
        assert_eq!(Granularity::for_span(Duration::days(60)), Granularity::Week);
        assert_eq!(Granularity::for_span(Duration::days(365)), Granularity::Month);
        assert_eq!(Granularity::Month.rolling_window(), 2880);
    }

    #[test]
    fn hourly_report() {
        let base = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let rows = vec![
            reading(base, 4.0, 0.5, 0.0),
            reading(base + Duration::minutes(15), 6.0, 0.25, 10.0),
            reading(base + Duration::minutes(30), 8.0, 0.0, 180.0),
            reading(base + Duration::hours(1), 10.0, 1.0, 270.0),
        ];
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        let end = start + Duration::days(1);
        let report = build_report(&rows, Some(start), Some(end), Field::Temperature, TempStat::Max, London);

        assert_eq!(report.granularity, Granularity::Hour);
        assert_eq!(report.periods, vec!["2025-01-10 09:00", "2025-01-10 10:00"]);
        assert_eq!(report.temperature, vec![Some(8.0), Some(10.0)]);
        assert_eq!(report.rainfall, vec![0.8, 1.0]);
        assert_eq!(report.wind_rose.N, 2);
        assert_eq!(report.wind_rose.S, 1);
        assert_eq!(report.wind_rose.W, 1);
        assert_eq!(report.boxplot.len(), 2);
        assert_eq!(report.boxplot[0].median, 6.0);
        assert_eq!(report.series.values.len(), 4);
        assert_eq!(report.series.rolling_average[3], 7.0);

        let stats = &report.statistics;
        assert_eq!(stats.median_temperature, Some(7.0));
        assert_eq!(stats.total_rainfall, Some(1.8));
        assert_eq!(stats.max_rain_rate, Some(1.8));
        assert_eq!(stats.rainy_days.as_deref(), Some("1/1"));
        assert_eq!(stats.max_wind_speed, Some(11.2));
    }

    #[test]
    fn empty_selection_has_empty_arrays() {
        let report = build_report(&[], None, None, Field::Rain, TempStat::Median, London);
        assert!(report.periods.is_empty());
        assert!(report.series.times.is_empty());
        assert!(report.statistics.median_temperature.is_none());
        assert!(report.statistics.rainy_days.is_none());
        assert_eq!(report.unit, "mm");
    }
}
