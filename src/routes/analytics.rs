use axum::{
    Json,
    extract::State,
    http::header,
    response::{Html, IntoResponse},
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::routes::extract::ApiQuery;
use crate::store;
use crate::weather::{
    self, Field, TimeSelection,
    analytics::{self, AnalyticsReport, TempStat},
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AnalyticsQuery {
    /// Preset range (`today`, `last7days`, `month`, `year`, `all`) or any range keyword
    pub range: Option<String>,
    /// Custom range start (RFC 3339 or local date)
    pub start: Option<String>,
    /// Custom range end. A date-only end covers that whole day.
    pub end: Option<String>,
    /// Field for the series and boxplot, default `temperature`
    pub field: Option<String>,
    /// Per-period temperature statistic: min, max, median (default)
    #[serde(default)]
    pub temp_stat: TempStat,
    pub device: Option<String>,
}

/// Statistics and chart series for the analytics dashboard
///
/// Defaults to today, falling back to the latest reading when today is empty.
#[utoipa::path(
    get,
    path = "/api/analytics",
    params(AnalyticsQuery),
    responses(
        (status = 200, description = "Report for the selected range", body = AnalyticsReport),
        (status = 400, description = "Invalid range or unknown field"),
        (status = 503, description = "Analytics disabled"),
    ),
    tag = "analytics"
)]
pub async fn get_analytics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> AppResult<Json<AnalyticsReport>> {
    let field = match query.field.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) => {
            Field::parse(name).ok_or_else(|| AppError::BadRequest(format!("Unknown field: {name}")))?
        }
        None => Field::Temperature,
    };

    let tz = state.config.local_timezone;
    let now = Utc::now();
    let device = query.device.as_deref();
    let explicit = [&query.range, &query.start, &query.end]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()));

    let range = if explicit { query.range.as_deref() } else { Some("today") };
    let mut selection = weather::resolve(range, query.start.as_deref(), query.end.as_deref(), now, tz)?;
    let mut rows = store::readings::select(&state.db, selection, device).await?;

    if rows.is_empty() && !explicit {
        tracing::debug!("No readings today, falling back to latest");
        selection = TimeSelection::Latest;
        rows = store::readings::select(&state.db, selection, device).await?;
    }

    let (start, end) = selection.bounds();
    Ok(Json(analytics::build_report(&rows, start, end, field, query.temp_stat, tz)))
}

/// Interactive charts page backed by `/api/analytics`.
pub async fn analytics_page() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=300")],
        Html(ANALYTICS_HTML),
    )
}

const ANALYTICS_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Weather Analytics</title>
    <script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
    <style>
        :root {
            --bg: #f8fafc;
            --surface: #ffffff;
            --border: #e2e8f0;
            --text: #1e293b;
            --muted: #64748b;
            --accent: #2563eb;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body { font-family: system-ui, -apple-system, sans-serif; background: var(--bg); color: var(--text); }
        .container { max-width: 1200px; margin: 0 auto; padding: 1.5rem; }
        header { display: flex; justify-content: space-between; align-items: center; flex-wrap: wrap; gap: 1rem; margin-bottom: 1rem; }
        h1 { font-size: 1.25rem; font-weight: 600; }
        .controls { display: flex; gap: 0.5rem; flex-wrap: wrap; align-items: center; }
        .controls button, .controls select, .controls input {
            padding: 0.375rem 0.75rem; border: 1px solid var(--border); border-radius: 0.375rem;
            background: var(--surface); font-size: 0.875rem;
        }
        .controls button.active { background: var(--accent); color: #fff; border-color: var(--accent); }
        .stats { display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 0.75rem; margin-bottom: 1rem; }
        .stat { background: var(--surface); border: 1px solid var(--border); border-radius: 0.5rem; padding: 0.75rem; }
        .stat .label { color: var(--muted); font-size: 0.75rem; }
        .stat .value { font-size: 1.125rem; font-weight: 600; }
        .charts { display: grid; grid-template-columns: repeat(auto-fit, minmax(480px, 1fr)); gap: 1rem; }
        .chart { background: var(--surface); border: 1px solid var(--border); border-radius: 0.5rem; min-height: 320px; }
        #error { color: #b91c1c; margin-bottom: 1rem; }
    </style>
</head>
<body>
    <div class="container">
        <header>
            <h1>Weather Analytics</h1>
            <div class="controls">
                <button data-range="today" class="active">Today</button>
                <button data-range="last7days">7 days</button>
                <button data-range="month">Month</button>
                <button data-range="year">Year</button>
                <button data-range="all">All</button>
                <input type="date" id="start">
                <input type="date" id="end">
                <button id="custom">Apply</button>
                <select id="field">
                    <option value="temperature">Temperature</option>
                    <option value="humidity">Humidity</option>
                    <option value="pressure">Pressure</option>
                    <option value="rain">Rain</option>
                    <option value="rain_rate">Rain rate</option>
                    <option value="luminance">Luminance</option>
                    <option value="wind_speed">Wind speed</option>
                    <option value="wind_direction">Wind direction</option>
                </select>
                <select id="temp_stat">
                    <option value="median">Median</option>
                    <option value="max">Max</option>
                    <option value="min">Min</option>
                </select>
            </div>
        </header>
        <div id="error"></div>
        <div class="stats" id="stats"></div>
        <div class="charts">
            <div class="chart" id="temperature"></div>
            <div class="chart" id="rainfall"></div>
            <div class="chart" id="series"></div>
            <div class="chart" id="boxplot"></div>
            <div class="chart" id="windrose"></div>
        </div>
    </div>
    <script>
        let selection = { range: 'today' };

        const fmt = (v, unit) => v === null || v === undefined ? 'N/A' : `${v}${unit}`;

        function params() {
            const p = new URLSearchParams(selection);
            p.set('field', document.getElementById('field').value);
            p.set('temp_stat', document.getElementById('temp_stat').value);
            return p;
        }

        function renderStats(s) {
            const items = [
                ['Median temp', fmt(s.median_temperature, ' °C')],
                ['Min temp', fmt(s.min_temperature, ' °C')],
                ['Max temp', fmt(s.max_temperature, ' °C')],
                ['Total rain', fmt(s.total_rainfall, ' mm')],
                ['Max daily rain', fmt(s.max_daily_rainfall, ' mm')],
                ['Max rain rate', fmt(s.max_rain_rate, ' mm/hr')],
                ['Rainy days', fmt(s.rainy_days, '')],
                ['Max wind', fmt(s.max_wind_speed, ' mph')],
            ];
            document.getElementById('stats').innerHTML = items
                .map(([label, value]) => `<div class="stat"><div class="label">${label}</div><div class="value">${value}</div></div>`)
                .join('');
        }

        async function load() {
            const error = document.getElementById('error');
            error.textContent = '';
            const res = await fetch(`/api/analytics?${params()}`);
            const data = await res.json();
            if (!res.ok) {
                error.textContent = data.error || 'Failed to load data';
                return;
            }
            renderStats(data.statistics);
            const layout = (title) => ({ title, margin: { t: 40, r: 20, b: 60, l: 50 } });
            Plotly.react('temperature', [{ type: 'bar', x: data.periods, y: data.temperature }],
                layout(`Temperature (${data.temp_stat}) by ${data.granularity}`));
            Plotly.react('rainfall', [{ type: 'bar', x: data.periods, y: data.rainfall, marker: { color: '#0ea5e9' } }],
                layout(`Rainfall by ${data.granularity}`));
            Plotly.react('series', [
                { type: 'scatter', mode: 'lines', name: data.field, x: data.series.times, y: data.series.values },
                { type: 'scatter', mode: 'lines', name: 'rolling average', x: data.series.times, y: data.series.rolling_average },
            ], layout(`${data.field} (${data.unit})`));
            Plotly.react('boxplot', data.boxplot.map(b => ({
                type: 'box', name: b.period, q1: [b.q1], median: [b.median], q3: [b.q3],
                lowerfence: [b.min], upperfence: [b.max],
            })), { ...layout(`${data.field} distribution`), showlegend: false });
            const dirs = ['N', 'NE', 'E', 'SE', 'S', 'SW', 'W', 'NW'];
            Plotly.react('windrose', [{ type: 'barpolar', r: dirs.map(d => data.wind_rose[d]), theta: dirs }],
                layout('Wind direction'));
        }

        document.querySelectorAll('[data-range]').forEach(btn => btn.addEventListener('click', () => {
            document.querySelectorAll('[data-range]').forEach(b => b.classList.remove('active'));
            btn.classList.add('active');
            selection = { range: btn.dataset.range };
            load();
        }));
        document.getElementById('custom').addEventListener('click', () => {
            const start = document.getElementById('start').value;
            const end = document.getElementById('end').value;
            if (!start || !end) return;
            document.querySelectorAll('[data-range]').forEach(b => b.classList.remove('active'));
            selection = { start, end };
            load();
        });
        document.getElementById('field').addEventListener('change', load);
        document.getElementById('temp_stat').addEventListener('change', load);
        load();
    </script>
</body>
</html>
"##;
