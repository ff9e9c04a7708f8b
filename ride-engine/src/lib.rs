//! Ride engines for RideSync
//!
//! - [`estimator`]: projects the time left on a route from power and slope
//! - [`sync`]: keeps a recorded video in step with the rider's position
//! - [`demo`]: a simulated rider on a demo loop, for running without a trainer

pub mod config;
pub mod demo;
pub mod error;
pub mod estimator;
pub mod sync;

pub use config::{EstimatorConfig, SyncConfig, UpdateThreshold};
pub use demo::DemoRide;
pub use error::SimulationError;
pub use estimator::{ProjectionPoint, RemainingTimeCache, RemainingTimeEstimator};
pub use sync::{PlayerCommand, SyncStatus, VideoSynchronizer};
