pub mod classifications;
pub mod forecast_hours;
pub mod readings;
pub mod service_flags;
