//! Domain logic for weather readings, independent of HTTP and storage.

pub mod analytics;
pub mod fields;
pub mod range;
pub mod reading;
pub mod stats;
pub mod summary;

pub use fields::Field;
pub use range::{TimeSelection, parse_range, resolve};
pub use reading::NewReading;
