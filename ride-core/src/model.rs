//! Route and ride data model
//!
//! Routes are immutable once built: the estimator and the synchronizer only
//! ever borrow them (usually through an `Arc<Route>` owned by the route
//! subsystem). Distances are meters, times seconds, speeds km/h, slopes percent.

use crate::adapter::{DEFAULT_EQUIPMENT_WEIGHT, DEFAULT_RIDER_WEIGHT};
use crate::error::RouteError;
use crate::units::*;
use chrono::{DateTime, Utc};
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Start and end closer than this make a loop route (meters)
pub const LOOP_THRESHOLD: f64 = 50.0;

/// One sample along a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lng: f64,

    /// Elevation above sea level (meters)
    pub elevation: f64,

    /// Slope of the segment starting at this point (percent)
    pub slope: f64,

    /// Cumulative distance from route start (meters)
    pub route_distance: f64,

    /// Distance from the previous point (meters)
    pub distance: f64,

    /// Playback time of the recorded video at this point (seconds)
    pub video_time: Option<f64>,

    /// Recorded speed at this point (km/h)
    pub video_speed: Option<f64>,
}

impl RoutePoint {
    /// Point without coordinates, for routes defined purely by distance and slope
    pub fn at(route_distance: f64, slope: f64) -> Self {
        Self {
            lat: 0.0,
            lng: 0.0,
            elevation: 0.0,
            slope,
            route_distance,
            distance: 0.0,
            video_time: None,
            video_speed: None,
        }
    }

    fn geo_point(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}

/// Haversine distance between two route points in meters
pub fn distance_between(a: &RoutePoint, b: &RoutePoint) -> f64 {
    Haversine::distance(a.geo_point(), b.geo_point())
}

/// One row of the video correspondence table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Video playback time (seconds)
    pub time: f64,
    /// Route distance shown at that time (meters)
    pub distance: f64,
    /// Speed of the recording vehicle (km/h)
    pub speed: f64,
    pub frame: u32,
}

/// Time/distance correspondence of a recorded video, ascending in both axes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMapping {
    entries: Vec<MappingEntry>,
}

impl VideoMapping {
    pub fn new(entries: Vec<MappingEntry>) -> Result<Self, RouteError> {
        for (index, entry) in entries.iter().enumerate() {
            if !entry.time.is_finite() {
                return Err(RouteError::NonFinite { field: "time", index });
            }
            if !entry.distance.is_finite() {
                return Err(RouteError::NonFinite {
                    field: "distance",
                    index,
                });
            }
            if !entry.speed.is_finite() {
                return Err(RouteError::NonFinite { field: "speed", index });
            }
            if index > 0 {
                let prev = &entries[index - 1];
                if entry.time < prev.time || entry.distance < prev.distance {
                    return Err(RouteError::MappingNotAscending {
                        index,
                        time: entry.time,
                        distance: entry.distance,
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    /// Build a mapping from the per-point video fields of a route
    pub fn from_points(points: &[RoutePoint]) -> Result<Self, RouteError> {
        let entries = points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                p.video_time.map(|time| MappingEntry {
                    time,
                    distance: p.route_distance,
                    speed: p.video_speed.unwrap_or(0.0),
                    frame: i as u32,
                })
            })
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&MappingEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&MappingEntry> {
        self.entries.last()
    }
}

/// An ordered, distance-ascending sequence of route points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    name: String,
    points: Vec<RoutePoint>,
    total_distance: f64,
    is_loop: bool,
    video: Option<VideoMapping>,
}

impl Route {
    /// Build a route from points that already carry cumulative distances.
    ///
    /// The total distance is the last point's route distance; the loop flag is
    /// derived from the start/end coordinates.
    pub fn new(name: impl Into<String>, points: Vec<RoutePoint>) -> Result<Self, RouteError> {
        if points.is_empty() {
            return Err(RouteError::NoPoints);
        }
        for (index, point) in points.iter().enumerate() {
            if !point.route_distance.is_finite() {
                return Err(RouteError::NonFinite {
                    field: "route_distance",
                    index,
                });
            }
            if !point.slope.is_finite() {
                return Err(RouteError::NonFinite {
                    field: "slope",
                    index,
                });
            }
            if index > 0 && point.route_distance < points[index - 1].route_distance {
                return Err(RouteError::NotAscending {
                    index,
                    distance: point.route_distance,
                    previous: points[index - 1].route_distance,
                });
            }
        }

        let first = &points[0];
        let last = &points[points.len() - 1];
        let is_loop = points.len() > 1 && distance_between(first, last) < LOOP_THRESHOLD;
        let total_distance = last.route_distance;

        Ok(Self {
            name: name.into(),
            points,
            total_distance,
            is_loop,
            video: None,
        })
    }

    /// Build a route from (lat, lng, elevation) samples, computing distances
    /// and segment slopes.
    pub fn from_coordinates(
        name: impl Into<String>,
        coords: &[(f64, f64, f64)],
    ) -> Result<Self, RouteError> {
        let mut points: Vec<RoutePoint> = coords
            .iter()
            .map(|&(lat, lng, elevation)| RoutePoint {
                lat,
                lng,
                elevation,
                ..RoutePoint::at(0.0, 0.0)
            })
            .collect();

        for i in 1..points.len() {
            let step = distance_between(&points[i - 1], &points[i]);
            points[i].distance = step;
            points[i].route_distance = points[i - 1].route_distance + step;
            if step > 0.0 {
                points[i - 1].slope = (points[i].elevation - points[i - 1].elevation) / step * 100.0;
            }
        }
        if points.len() > 1 {
            let n = points.len();
            points[n - 1].slope = points[n - 2].slope;
        }

        Self::new(name, points)
    }

    /// Override the derived loop flag
    pub fn with_loop(mut self, is_loop: bool) -> Self {
        self.is_loop = is_loop;
        self
    }

    /// Override the total distance, e.g. to include the closing segment of a
    /// loop. Never shorter than the last point.
    pub fn with_total_distance(mut self, total_distance: f64) -> Self {
        let last = self.points.last().map(|p| p.route_distance).unwrap_or(0.0);
        self.total_distance = total_distance.max(last);
        self
    }

    pub fn with_video(mut self, video: VideoMapping) -> Self {
        self.video = Some(video);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    pub fn video(&self) -> Option<&VideoMapping> {
        self.video.as_ref().filter(|v| !v.is_empty())
    }

    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            name: self.name.clone(),
            total_distance: Meters(self.total_distance),
            points: self.points.len(),
            is_loop: self.is_loop,
            has_video: self.video().is_some(),
            video_duration: self.video().and_then(|v| v.last()).map(|e| Seconds(e.time)),
        }
    }
}

/// Serializable route overview for the API
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub name: String,
    pub total_distance: Meters,
    pub points: usize,
    pub is_loop: bool,
    pub has_video: bool,
    pub video_duration: Option<Seconds>,
}

/// One activity sample produced by the ride/session service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideFrame {
    /// Timestamp when this frame was captured
    pub timestamp: DateTime<Utc>,

    /// Adapter that produced this frame
    pub source: String,

    /// Time since the ride started
    pub elapsed_time: Seconds,

    pub power: Option<Watts>,

    /// Average power over the ride so far
    pub average_power: Option<Watts>,

    pub speed: Option<KilometersPerHour>,

    /// Rider position along the route (not lap-reduced)
    pub route_distance: Meters,

    /// Slope scaling applied to the route (0-100)
    pub reality_factor: Percentage,

    pub rider_weight: Kilograms,

    /// Bike and equipment added on top of the rider
    pub equipment_weight: Kilograms,
}

impl Default for RideFrame {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            source: String::new(),
            elapsed_time: Seconds(0.0),
            power: None,
            average_power: None,
            speed: None,
            route_distance: Meters(0.0),
            reality_factor: Percentage(100.0),
            rider_weight: Kilograms(DEFAULT_RIDER_WEIGHT),
            equipment_weight: Kilograms(DEFAULT_EQUIPMENT_WEIGHT),
        }
    }
}

/// Last known state of the video player
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub timestamp: DateTime<Utc>,
    pub rate: f64,
    /// Video time (seconds)
    pub time: f64,
    /// Route distance shown at that time (meters)
    pub route_distance: f64,
    /// Recorded speed at that point (km/h)
    pub speed: f64,
}

/// Last known state of the rider
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActivityStatus {
    pub timestamp: DateTime<Utc>,
    /// Lap-reduced route distance (meters)
    pub route_distance: f64,
    /// Rider speed (km/h)
    pub speed: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(distances: &[f64]) -> Vec<RoutePoint> {
        distances.iter().map(|&d| RoutePoint::at(d, 0.0)).collect()
    }

    #[test]
    fn test_empty_route_rejected() {
        assert_eq!(Route::new("empty", vec![]).unwrap_err(), RouteError::NoPoints);
    }

    #[test]
    fn test_descending_points_rejected() {
        let err = Route::new("bad", flat(&[0.0, 100.0, 50.0])).unwrap_err();
        assert!(matches!(err, RouteError::NotAscending { index: 2, .. }));
    }

    #[test]
    fn test_total_distance_never_below_last_point() {
        let route = Route::new("r", flat(&[0.0, 100.0]))
            .unwrap()
            .with_total_distance(50.0);
        assert_eq!(route.total_distance(), 100.0);
    }

    #[test]
    fn test_from_coordinates_computes_distance_and_slope() {
        // ~111m per 0.001 degree of latitude
        let route = Route::from_coordinates(
            "climb",
            &[(47.0, 8.0, 400.0), (47.001, 8.0, 411.1), (47.002, 8.0, 411.1)],
        )
        .unwrap();
        let points = route.points();
        assert!((points[1].distance - 111.2).abs() < 0.5);
        assert!((points[0].slope - 10.0).abs() < 0.1);
        assert!(points[1].slope.abs() < 1e-9);
        assert!(!route.is_loop());
    }

    #[test]
    fn test_loop_detected_from_coordinates() {
        let route = Route::from_coordinates(
            "loop",
            &[
                (47.0, 8.0, 400.0),
                (47.001, 8.0, 400.0),
                (47.001, 8.001, 400.0),
                (47.0001, 8.0, 400.0),
            ],
        )
        .unwrap();
        assert!(route.is_loop());
    }

    #[test]
    fn test_mapping_must_ascend() {
        let err = VideoMapping::new(vec![
            MappingEntry { time: 0.0, distance: 0.0, speed: 30.0, frame: 0 },
            MappingEntry { time: 5.0, distance: 40.0, speed: 30.0, frame: 150 },
            MappingEntry { time: 4.0, distance: 50.0, speed: 30.0, frame: 120 },
        ])
        .unwrap_err();
        assert!(matches!(err, RouteError::MappingNotAscending { index: 2, .. }));
    }

    #[test]
    fn test_mapping_from_points() {
        let mut points = flat(&[0.0, 100.0, 200.0]);
        points[0].video_time = Some(0.0);
        points[0].video_speed = Some(36.0);
        points[2].video_time = Some(20.0);
        points[2].video_speed = Some(36.0);
        let mapping = VideoMapping::from_points(&points).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.last().unwrap().distance, 200.0);
    }
}
