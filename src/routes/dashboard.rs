use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use chrono_tz::Tz;

use crate::common::AppState;
use crate::error::AppResult;
use crate::routes::html_escape;
use crate::store;
use crate::weather::{
    TimeSelection,
    summary::{self, DashboardSummary},
};

fn show(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.1}{unit}"))
}

fn render(summary: &DashboardSummary, tz: Tz) -> String {
    let mut latest = String::new();
    match &summary.latest {
        Some(l) => {
            let direction = match (l.wind_direction, l.compass) {
                (Some(deg), Some(compass)) => format!("{deg:.0}&deg; ({compass})"),
                _ => "N/A".to_string(),
            };
            let _ = write!(
                latest,
                r#"<p class="muted">{device} &middot; {time}</p>
            <table>
                <tr><th>Temperature</th><td>{temp}</td></tr>
                <tr><th>Humidity</th><td>{humidity}</td></tr>
                <tr><th>Rain rate</th><td>{rain_rate}</td></tr>
                <tr><th>Pressure</th><td>{pressure}</td></tr>
                <tr><th>Luminance</th><td>{luminance}</td></tr>
                <tr><th>Wind speed</th><td>{wind}</td></tr>
                <tr><th>Wind direction</th><td>{direction}</td></tr>
            </table>"#,
                device = html_escape(&l.device_id),
                time = l.local_time,
                temp = show(Some(l.temperature), " &deg;C"),
                humidity = show(Some(l.humidity), " %"),
                rain_rate = show(l.rain_rate_mm_per_hour, " mm/hr"),
                pressure = show(l.pressure, " hPa"),
                luminance = show(l.luminance, " lux"),
                wind = show(l.wind_speed_mph, " mph"),
            );
        }
        None => latest.push_str(r#"<p class="muted">No readings yet.</p>"#),
    }

    let mut periods = String::new();
    for p in &summary.periods {
        let _ = write!(
            periods,
            r#"
                <tr><th>{title}</th><td>{max}</td><td>{min}</td><td>{rain}</td><td>{rate}</td><td>{wind}</td><td>{pressure}</td></tr>"#,
            title = p.title,
            max = show(p.max_temperature, " &deg;C"),
            min = show(p.min_temperature, " &deg;C"),
            rain = show(p.total_rain, " mm"),
            rate = show(p.max_rain_rate, " mm/hr"),
            wind = show(p.max_wind_speed, " mph"),
            pressure = show(p.avg_pressure, " hPa"),
        );
    }

    let rainy = &summary.rainy_days;
    let rainy_days = match rainy.percent() {
        Some(pct) => format!("{} of {} days ({pct}%)", rainy.rainy, rainy.days_with_data),
        None => "N/A".to_string(),
    };

    DASHBOARD_HTML
        .replace("{{latest}}", &latest)
        .replace("{{periods}}", &periods)
        .replace("{{rainy_days}}", &rainy_days)
        .replace(
            "{{generated}}",
            &summary
                .generated_at
                .with_timezone(&tz)
                .format("%d %B %Y %H:%M")
                .to_string(),
        )
}

async fn build_page(state: &AppState) -> AppResult<String> {
    let now = Utc::now();
    let tz = state.config.local_timezone;

    let latest = store::readings::latest(&state.db, None).await?;
    let window = store::readings::select(
        &state.db,
        TimeSelection::between(Some(summary::window_start(now, tz)?), Some(now))?,
        None,
    )
    .await?;
    let summary = summary::summarize(latest.as_ref(), &window, now, tz)?;

    tracing::debug!(window = window.len(), "Dashboard rendered");
    Ok(render(&summary, tz))
}

/// Server-rendered summary of the station's readings.
pub async fn dashboard(State(state): State<AppState>) -> AppResult<Response> {
    let ttl = state.config.dashboard_cache_seconds;

    let cache = &state.dashboard_cache;
    let page = if ttl == 0 {
        Arc::new(build_page(&state).await?)
    } else if let Some(page) = cache.current().await {
        page
    } else {
        let generation = cache.generation();
        let page = Arc::new(build_page(&state).await?);
        cache.store(generation, page.clone()).await;
        page
    };

    let cache_control = format!("public, max-age={ttl}");
    Ok((
        [(header::CACHE_CONTROL, cache_control)],
        Html(page.as_str().to_owned()),
    )
        .into_response())
}

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Weather Station</title>
    <style>
        :root {
            --bg: #f8fafc;
            --surface: #ffffff;
            --border: #e2e8f0;
            --text: #1e293b;
            --muted: #64748b;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body { font-family: system-ui, -apple-system, sans-serif; background: var(--bg); color: var(--text); }
        .container { max-width: 960px; margin: 0 auto; padding: 1.5rem; }
        h1 { font-size: 1.25rem; font-weight: 600; margin-bottom: 1rem; }
        h2 { font-size: 1rem; font-weight: 600; margin: 1.5rem 0 0.5rem; }
        .card { background: var(--surface); border: 1px solid var(--border); border-radius: 0.5rem; padding: 1rem; }
        table { width: 100%; border-collapse: collapse; font-size: 0.875rem; }
        th, td { text-align: left; padding: 0.375rem 0.5rem; border-bottom: 1px solid var(--border); }
        .muted { color: var(--muted); font-size: 0.875rem; margin-bottom: 0.5rem; }
        nav a { color: var(--muted); margin-right: 1rem; font-size: 0.875rem; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Weather Station</h1>
        <nav><a href="/analytics">Analytics</a><a href="/classifier">Sky</a></nav>

        <h2>Latest conditions</h2>
        <div class="card">
            {{latest}}
        </div>

        <h2>Summary</h2>
        <div class="card">
            <table>
                <tr><th></th><th>Max temp</th><th>Min temp</th><th>Rain</th><th>Max rain rate</th><th>Max wind</th><th>Avg pressure</th></tr>{{periods}}
            </table>
        </div>

        <h2>Rainy days this year</h2>
        <div class="card">{{rainy_days}}</div>

        <p class="muted" style="margin-top: 1rem">Generated {{generated}}</p>
    </div>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::summary::{PeriodSummary, RainyDays};
    use chrono_tz::Europe::London;

    #[test]
    fn missing_values_render_as_not_available() {
        let summary = DashboardSummary {
            generated_at: Utc::now(),
            latest: None,
            periods: vec![PeriodSummary {
                key: "today",
                title: "Today",
                readings: 0,
                max_temperature: None,
                min_temperature: None,
                total_rain: None,
                max_rain_rate: None,
                max_wind_speed: None,
                avg_pressure: None,
            }],
            rainy_days: RainyDays {
                rainy: 0,
                days_with_data: 0,
            },
        };
        let page = render(&summary, London);
        assert!(page.contains("No readings yet."));
        assert!(page.contains("<th>Today</th><td>N/A</td>"));
        assert!(page.contains(r#"<div class="card">N/A</div>"#));
    }
}
