//! Met Office DataHub site-specific hourly forecast.

mod client;
pub mod models;

pub use client::MetOfficeClient;
