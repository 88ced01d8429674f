//! Air-quality and weather context for one postal code.

use serde::{Deserialize, Serialize};

/// Where an `EnvironmentalSnapshot` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentSource {
    /// Live upstream weather/pollution API.
    Api,
    /// Deterministic synthetic values derived from the postal code.
    Fallback,
}

/// Fetched fresh for every request; never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalSnapshot {
    /// Ordinal air quality index, 1 (good) to 5 (very poor).
    pub aqi: u8,
    /// Fine particulate matter, µg/m³.
    pub pm25: f64,
    /// Air temperature, °C.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: u8,
    pub source: EnvironmentSource,
}
