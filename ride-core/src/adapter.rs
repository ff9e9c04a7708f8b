//! Collaborator traits: ride data sources and activity statistics

use crate::model::{RideFrame, Route};
use anyhow::Result;
use std::sync::Arc;

/// Rider weight used when the user has not configured one (kg)
pub const DEFAULT_RIDER_WEIGHT: f64 = 75.0;

/// Fixed bike and equipment offset added to the rider weight (kg)
pub const DEFAULT_EQUIPMENT_WEIGHT: f64 = 10.0;

/// Trait for ride data sources (trainers, simulators, demo rides)
///
/// Each adapter is responsible for:
/// - Detecting if its device is available
/// - Producing ride frames while active
/// - Exposing the route being ridden
pub trait RideAdapter: Send + Sync {
    /// Stable identifier used in API paths (e.g. "demo")
    fn key(&self) -> &str;

    /// Get the display name of this adapter
    fn name(&self) -> &str;

    /// Check if the source is currently available
    ///
    /// This should be a lightweight check.
    fn detect(&self) -> bool;

    /// Start producing frames
    fn start(&mut self) -> Result<()>;

    /// Stop producing frames
    fn stop(&mut self) -> Result<()>;

    /// Read the next ride frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a new frame is available
    /// - `Ok(None)` if no new data (non-blocking)
    /// - `Err(_)` if an error occurred
    fn read_frame(&mut self) -> Result<Option<RideFrame>>;

    /// Get whether the adapter is currently active
    fn is_active(&self) -> bool;

    /// Route this source is riding, if any
    fn route(&self) -> Option<Arc<Route>>;
}

/// Read view of the activity/session statistics the estimator depends on
pub trait ActivitySource {
    /// Seconds since the ride started
    fn elapsed_time(&self) -> f64;

    /// Current power (W)
    fn current_power(&self) -> Option<f64>;

    /// Average power over the ride so far (W)
    fn average_power(&self) -> Option<f64>;

    /// Current speed (km/h)
    fn current_speed(&self) -> Option<f64>;

    /// Slope scaling, 0-100
    fn reality_factor(&self) -> f64;

    /// Rider weight (kg)
    fn rider_weight(&self) -> f64;

    /// Bike and equipment weight (kg)
    fn equipment_weight(&self) -> f64 {
        DEFAULT_EQUIPMENT_WEIGHT
    }

    /// Mass the physics model moves
    fn total_mass(&self) -> f64 {
        self.rider_weight() + self.equipment_weight()
    }
}

impl ActivitySource for RideFrame {
    fn elapsed_time(&self) -> f64 {
        self.elapsed_time.0
    }

    fn current_power(&self) -> Option<f64> {
        self.power.map(|p| p.0)
    }

    fn average_power(&self) -> Option<f64> {
        self.average_power.map(|p| p.0)
    }

    fn current_speed(&self) -> Option<f64> {
        self.speed.map(|s| s.0)
    }

    fn reality_factor(&self) -> f64 {
        self.reality_factor.0
    }

    fn rider_weight(&self) -> f64 {
        self.rider_weight.0
    }

    fn equipment_weight(&self) -> f64 {
        self.equipment_weight.0
    }
}
