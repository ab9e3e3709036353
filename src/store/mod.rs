//! Persistence for every service, over the shared sea-orm connection.

pub mod classifications;
pub mod flags;
pub mod forecasts;
pub mod readings;
