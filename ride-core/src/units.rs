//! Type-safe wrappers for physical units
//!
//! The physics and index code works on raw `f64` for speed; these newtypes
//! are used at the serialization boundary so payloads carry explicit units.
//!
//! All unit types serialize with 4 decimal places to reduce JSON payload size.

use serde::{Deserialize, Serialize};

/// Factor between m/s and km/h
pub const KMH_PER_MS: f64 = 3.6;

/// Round f64 to 4 decimal places for compact JSON serialization
fn round4<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((*val * 10000.0).round() / 10000.0)
}

/// Meters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Meters(#[serde(serialize_with = "round4")] pub f64);

/// Seconds (timestamps, durations)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Seconds(#[serde(serialize_with = "round4")] pub f64);

/// Meters per second
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct MetersPerSecond(#[serde(serialize_with = "round4")] pub f64);

impl MetersPerSecond {
    pub fn to_kmh(self) -> KilometersPerHour {
        KilometersPerHour(self.0 * KMH_PER_MS)
    }
}

/// Kilometers per hour
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct KilometersPerHour(#[serde(serialize_with = "round4")] pub f64);

impl KilometersPerHour {
    pub fn to_ms(self) -> MetersPerSecond {
        MetersPerSecond(self.0 / KMH_PER_MS)
    }
}

/// Watts
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Watts(#[serde(serialize_with = "round4")] pub f64);

/// Kilograms
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Kilograms(#[serde(serialize_with = "round4")] pub f64);

/// Percentage (0.0 to 100.0), used for slope scaling
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percentage(#[serde(serialize_with = "round4")] pub f64);

impl Percentage {
    /// Create a new percentage, clamping to [0.0, 100.0]
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 100.0))
    }

    /// Get as fraction (0-1)
    pub fn as_fraction(&self) -> f64 {
        self.0 / 100.0
    }
}
