use serde::{Deserialize, Serialize};

/// Response from `/sitespecific/v0/point/hourly` (GeoJSON feature collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyForecastResponse {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    #[serde(default)]
    pub model_run_date: Option<String>,
    #[serde(default)]
    pub time_series: Vec<TimeStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeStep {
    /// e.g. `2025-06-01T12:00Z`
    pub time: String,
    #[serde(default)]
    pub screen_temperature: Option<f64>,
    #[serde(default)]
    pub screen_relative_humidity: Option<f64>,
    /// Mean sea-level pressure in Pa.
    #[serde(default)]
    pub mslp: Option<f64>,
    #[serde(default)]
    pub total_precip_amount: Option<f64>,
    #[serde(default)]
    pub prob_of_precipitation: Option<f64>,
    #[serde(default, rename = "windSpeed10m")]
    pub wind_speed_10m: Option<f64>,
}
