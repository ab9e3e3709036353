//! Measured quantities, their plausible ranges and display conversions.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::readings;

/// Rain rate is stored in mm/s and shown in mm/hr.
pub const RAIN_RATE_TO_MM_PER_HOUR: f64 = 3600.0;
/// Wind speed is stored in m/s and shown in mph.
pub const WIND_SPEED_TO_MPH: f64 = 2.23694;

/// A numeric field of a weather reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Temperature,
    Humidity,
    Pressure,
    Rain,
    RainRate,
    Luminance,
    WindSpeed,
    WindDirection,
}

impl Field {
    pub const ALL: [Self; 8] = [
        Self::Temperature,
        Self::Humidity,
        Self::Pressure,
        Self::Rain,
        Self::RainRate,
        Self::Luminance,
        Self::WindSpeed,
        Self::WindDirection,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Rain => "rain",
            Self::RainRate => "rain_rate",
            Self::Luminance => "luminance",
            Self::WindSpeed => "wind_speed",
            Self::WindDirection => "wind_direction",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Inclusive range of physically plausible stored values.
    #[must_use]
    pub fn plausible_range(self) -> (f64, f64) {
        match self {
            Self::Temperature => (-50.0, 60.0),
            Self::Humidity => (0.0, 100.0),
            Self::Pressure => (800.0, 1100.0),
            Self::Rain => (0.0, 500.0),
            Self::RainRate => (0.0, 10.0),
            Self::Luminance => (0.0, 200_000.0),
            Self::WindSpeed => (0.0, 120.0),
            Self::WindDirection => (0.0, 360.0),
        }
    }

    /// Unit of the value returned by [`Field::display`].
    #[must_use]
    pub fn display_unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::Pressure => "hPa",
            Self::Rain => "mm",
            Self::RainRate => "mm/hr",
            Self::Luminance => "lux",
            Self::WindSpeed => "mph",
            Self::WindDirection => "°",
        }
    }

    /// Convert a stored value to its display unit.
    #[must_use]
    pub fn display(self, value: f64) -> f64 {
        match self {
            Self::RainRate => value * RAIN_RATE_TO_MM_PER_HOUR,
            Self::WindSpeed => value * WIND_SPEED_TO_MPH,
            _ => value,
        }
    }

    /// Stored value of this field on a reading.
    #[must_use]
    pub fn value(self, reading: &readings::Model) -> Option<f64> {
        match self {
            Self::Temperature => Some(reading.temperature),
            Self::Humidity => Some(reading.humidity),
            Self::Pressure => reading.pressure,
            Self::Rain => reading.rain,
            Self::RainRate => reading.rain_rate,
            Self::Luminance => reading.luminance,
            Self::WindSpeed => reading.wind_speed,
            Self::WindDirection => reading.wind_direction,
        }
    }

    /// Stored value converted to its display unit.
    #[must_use]
    pub fn display_value(self, reading: &readings::Model) -> Option<f64> {
        self.value(reading).map(|v| self.display(v))
    }
}

/// Round to one decimal place.
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

const COMPASS_16: [&str; 32] = [
    "N", "NNE", "NNE", "NE", "NE", "ENE", "ENE", "E", "E", "ESE", "ESE", "SE", "SE", "SSE", "SSE",
    "S", "S", "SSW", "SSW", "SW", "SW", "WSW", "WSW", "W", "W", "WNW", "WNW", "NW", "NW", "NNW",
    "NNW", "N",
];

/// Sixteen-point compass label for a bearing in degrees.
#[must_use]
pub fn compass16(degrees: f64) -> &'static str {
    let index = ((degrees + 5.625) / 11.25).floor().rem_euclid(32.0) as usize;
    COMPASS_16[index]
}

pub const COMPASS_8: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Eight-point compass label for a bearing in degrees. Bearings exactly
/// between two points go to the even sector.
#[must_use]
pub fn compass8(degrees: f64) -> &'static str {
    let index = (degrees / 45.0).round_ties_even().rem_euclid(8.0) as usize;
    COMPASS_8[index]
}
