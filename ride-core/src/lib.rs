//! RideSync Core Library
//!
//! This crate provides the route data model, the power/speed physics
//! integrator and the distance/time index shared by the remaining-time
//! estimator and the video synchronizer.

pub mod adapter;
pub mod clock;
pub mod error;
pub mod index;
pub mod model;
pub mod physics;
pub mod units;

pub use adapter::{ActivitySource, RideAdapter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::RouteError;
pub use index::RouteIndex;
pub use model::{MappingEntry, RideFrame, Route, RoutePoint, VideoMapping};
pub use physics::{Motion, Outcome, ResistanceModel, RoadResistance};
