use std::env;
use std::str::FromStr;

use chrono_tz::Tz;

use crate::killswitch::Service;

#[derive(Debug, Clone)]
pub enum Deployment {
    Local,
    Dev,
    Stage,
    Prod,
}

impl Deployment {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            "stage" | "staging" => Self::Stage,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // API settings
    pub api_host: String,
    pub api_port: u16,

    // Which services this instance mounts, and which are switched off at deploy time
    pub services: Vec<Service>,
    pub disabled_services: Vec<Service>,

    // Cloud project
    pub project_id: String,
    pub location: String,
    pub bucket_name: Option<String>,

    // Station
    pub local_timezone: Tz,
    pub default_device_id: String,

    // Hosted models
    pub model_api_base_url: String,
    pub model_api_token: Option<String>,
    pub chat_model: String,
    pub vision_model: String,
    pub chat_max_context_rows: usize,
    pub http_timeout_seconds: u64,

    // Object storage
    pub storage_base_url: String,

    // Forecast source
    pub met_office_base_url: String,
    pub met_office_api_key: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub forecast_refresh_interval_seconds: u64,

    // Dashboard cache
    pub dashboard_cache_seconds: u64,

    // Classifier uploads
    pub classifier_max_image_bytes: usize,

    // Rate limiting (model-backed routes)
    pub disable_rate_limiting: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,

    // Application metadata
    pub deployment: Deployment,
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set,
    /// and `ConfigError::Invalid` if the service list or timezone cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let services = Service::parse_list(&env::var("SERVICES").unwrap_or_else(|_| "all".into()))
            .map_err(|e| ConfigError::Invalid("SERVICES", e))?;
        let disabled_services = Service::parse_list(&env::var("DISABLED_SERVICES").unwrap_or_default())
            .map_err(|e| ConfigError::Invalid("DISABLED_SERVICES", e))?;

        let timezone_name = env::var("LOCAL_TIMEZONE").unwrap_or_else(|_| "Europe/London".into());
        let local_timezone = timezone_name
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid("LOCAL_TIMEZONE", e.to_string()))?;

        let location = env::var("LOCATION").unwrap_or_else(|_| "europe-west2".to_string());
        let needs_model = services.contains(&Service::Chat) || services.contains(&Service::Classifier);
        let project_id = match optional("PROJECT_ID") {
            Some(id) => id,
            None if needs_model => return Err(ConfigError::Missing("PROJECT_ID")),
            None => String::new(),
        };

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // API settings
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_or("PORT", 8080),

            services,
            disabled_services,

            // Cloud project
            project_id,
            model_api_base_url: optional("MODEL_API_BASE_URL")
                .unwrap_or_else(|| format!("https://{location}-aiplatform.googleapis.com")),
            location,
            bucket_name: optional("BUCKET_NAME"),

            // Station
            local_timezone,
            default_device_id: optional("DEFAULT_DEVICE_ID").unwrap_or_else(|| "pico-1".to_string()),

            // Hosted models
            model_api_token: optional("MODEL_API_TOKEN"),
            chat_model: optional("CHAT_MODEL")
                .unwrap_or_else(|| "gemini-2.0-flash-lite-001".to_string()),
            vision_model: optional("VISION_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            chat_max_context_rows: parsed_or("CHAT_MAX_CONTEXT_ROWS", 500),
            http_timeout_seconds: parsed_or("HTTP_TIMEOUT_SECONDS", 60),

            // Object storage
            storage_base_url: optional("STORAGE_BASE_URL")
                .unwrap_or_else(|| "https://storage.googleapis.com".to_string()),

            // Forecast source
            met_office_base_url: optional("MET_OFFICE_BASE_URL")
                .unwrap_or_else(|| "https://data.hub.api.metoffice.gov.uk".to_string()),
            met_office_api_key: optional("MET_OFFICE_API_KEY"),
            latitude: optional("LATITUDE").and_then(|v| v.parse().ok()),
            longitude: optional("LONGITUDE").and_then(|v| v.parse().ok()),
            forecast_refresh_interval_seconds: parsed_or("FORECAST_REFRESH_INTERVAL_SECONDS", 0),

            dashboard_cache_seconds: parsed_or("DASHBOARD_CACHE_SECONDS", 60),
            classifier_max_image_bytes: parsed_or("CLASSIFIER_MAX_IMAGE_BYTES", 10 * 1024 * 1024),

            // Rate limiting
            disable_rate_limiting: parsed_or("DISABLE_RATE_LIMITING", false),
            rate_limit_per_second: parsed_or("RATE_LIMIT_PER_SECOND", 1),
            rate_limit_burst: parsed_or("RATE_LIMIT_BURST", 20),

            // Application metadata
            deployment: Deployment::from_str(
                &env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string()),
            ),
        })
    }

    /// Configuration for tests and local tooling: every service mounted,
    /// rate limiting off, and all upstream endpoints unset.
    #[must_use]
    pub fn for_database(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            api_host: "127.0.0.1".to_string(),
            api_port: 8080,
            services: Service::ALL.to_vec(),
            disabled_services: Vec::new(),
            project_id: "weather-station-local".to_string(),
            location: "europe-west2".to_string(),
            bucket_name: None,
            local_timezone: chrono_tz::Europe::London,
            default_device_id: "pico-1".to_string(),
            model_api_base_url: "http://127.0.0.1:9".to_string(),
            model_api_token: None,
            chat_model: "gemini-2.0-flash-lite-001".to_string(),
            vision_model: "gemini-1.5-flash".to_string(),
            chat_max_context_rows: 500,
            http_timeout_seconds: 10,
            storage_base_url: "http://127.0.0.1:9".to_string(),
            met_office_base_url: "http://127.0.0.1:9".to_string(),
            met_office_api_key: None,
            latitude: None,
            longitude: None,
            forecast_refresh_interval_seconds: 0,
            dashboard_cache_seconds: 60,
            classifier_max_image_bytes: 10 * 1024 * 1024,
            disable_rate_limiting: true,
            rate_limit_per_second: 1,
            rate_limit_burst: 20,
            deployment: Deployment::Local,
        }
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    #[must_use]
    pub fn mounts(&self, service: Service) -> bool {
        self.services.contains(&service)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
