//! Tunables for the estimator and the synchronizer
//!
//! Both structs deserialize with defaults for every missing field, so a
//! config file only needs to name what it changes.

use serde::{Deserialize, Serialize};

pub const MIN_PLAYBACK_RATE: f64 = 0.25;
pub const MAX_PLAYBACK_RATE: f64 = 2.5;

/// Minimum time between two corrective rate updates (ms)
pub const MAX_RATE_UPDATE: u64 = 1000;

/// Re-simulate every `interval` seconds while the ride is shorter than `until`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateThreshold {
    pub until: f64,
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Integration step (seconds)
    pub step: f64,
    pub max_steps_per_segment: usize,
    pub max_segments: usize,
    /// Checked in order; the first entry whose `until` exceeds the ride time wins
    pub update_frequency: Vec<UpdateThreshold>,
    /// Interval once the ride is past every threshold (seconds)
    pub fallback_interval: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            step: 1.0,
            max_steps_per_segment: 3600,
            max_segments: 100_000,
            update_frequency: vec![
                UpdateThreshold {
                    until: 150.0,
                    interval: 10.0,
                },
                UpdateThreshold {
                    until: 300.0,
                    interval: 5.0,
                },
            ],
            fallback_interval: 3.0,
        }
    }
}

impl EstimatorConfig {
    /// How long a cached estimate stays valid for a ride of `ride_time` seconds
    pub fn update_interval(&self, ride_time: f64) -> f64 {
        self.update_frequency
            .iter()
            .find(|t| ride_time < t.until)
            .map(|t| t.interval)
            .unwrap_or(self.fallback_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub min_playback_rate: f64,
    pub max_playback_rate: f64,
    /// Minimum time between corrections (ms)
    pub max_rate_update_ms: u64,
    /// Position gap treated as "in sync" (meters)
    pub position_tolerance: f64,
    /// Rate changes smaller than this are not sent
    pub rate_tolerance: f64,
    /// Time over which a position gap should be closed (seconds)
    pub catch_up_time: f64,
    /// Gaps larger than this are closed with a seek (meters)
    pub seek_threshold: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_playback_rate: MIN_PLAYBACK_RATE,
            max_playback_rate: MAX_PLAYBACK_RATE,
            max_rate_update_ms: MAX_RATE_UPDATE,
            position_tolerance: 1.0,
            rate_tolerance: 0.01,
            catch_up_time: 10.0,
            seek_threshold: 250.0,
        }
    }
}

impl SyncConfig {
    pub fn clamp_rate(&self, rate: f64) -> f64 {
        rate.clamp(self.min_playback_rate, self.max_playback_rate)
    }
}
