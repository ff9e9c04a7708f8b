//! Distance ↔ time lookups over a route and its video mapping
//!
//! Every lookup returns `None` for "no data": no video mapping, a negative
//! position, or a position past the end of a non-loop route. Positions on a
//! loop route wrap around the total distance.

use crate::model::{MappingEntry, Route, RoutePoint};
use crate::units::KMH_PER_MS;

/// Borrowed read-only view over a [`Route`]
#[derive(Debug, Clone, Copy)]
pub struct RouteIndex<'a> {
    route: &'a Route,
}

impl<'a> RouteIndex<'a> {
    pub fn new(route: &'a Route) -> Self {
        Self { route }
    }

    pub fn route(&self) -> &'a Route {
        self.route
    }

    /// Reduce `distance` into the route's range.
    ///
    /// Loop routes wrap anything past the total distance; the exact end of a
    /// loop stays at the end. Non-loop routes reject positions past the end.
    pub fn lap_relative(&self, distance: f64) -> Option<f64> {
        let total = self.route.total_distance();
        if !distance.is_finite() || distance < 0.0 || total <= 0.0 {
            return None;
        }
        if distance <= total {
            return Some(distance);
        }
        if self.route.is_loop() {
            Some(distance.rem_euclid(total))
        } else {
            None
        }
    }

    /// Index of the last route point at or before `distance` (lap-relative)
    pub fn point_index_at(&self, distance: f64) -> Option<usize> {
        let distance = self.lap_relative(distance)?;
        let points = self.route.points();
        let after = points.partition_point(|p| p.route_distance <= distance);
        Some(after.saturating_sub(1))
    }

    /// Interpolated route point at `distance`
    pub fn position_at(&self, distance: f64) -> Option<RoutePoint> {
        let distance = self.lap_relative(distance)?;
        let idx = self.point_index_at(distance)?;
        let points = self.route.points();
        let current = &points[idx];

        let (next, next_distance) = match points.get(idx + 1) {
            Some(next) => (next, next.route_distance),
            None if self.route.is_loop() => (&points[0], self.route.total_distance()),
            None => (current, current.route_distance),
        };

        let gap = next_distance - current.route_distance;
        let f = if gap > 0.0 {
            ((distance - current.route_distance) / gap).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let lerp = |a: f64, b: f64| a + (b - a) * f;

        Some(RoutePoint {
            lat: lerp(current.lat, next.lat),
            lng: lerp(current.lng, next.lng),
            elevation: lerp(current.elevation, next.elevation),
            slope: current.slope,
            route_distance: distance,
            distance: distance - current.route_distance,
            video_time: self.video_time_by_position(distance),
            video_speed: self.recorded_speed_at(distance),
        })
    }

    fn entries(&self) -> Option<&'a [MappingEntry]> {
        self.route.video().map(|v| v.entries())
    }

    fn index_by_distance(entries: &[MappingEntry], distance: f64) -> usize {
        entries
            .partition_point(|e| e.distance <= distance)
            .saturating_sub(1)
    }

    fn index_by_time(entries: &[MappingEntry], time: f64) -> usize {
        entries.partition_point(|e| e.time <= time).saturating_sub(1)
    }

    /// Mapping entry whose segment contains `distance`
    pub fn mapping_by_distance(&self, distance: f64) -> Option<&'a MappingEntry> {
        let entries = self.entries()?;
        let distance = self.lap_relative(distance)?;
        entries.get(Self::index_by_distance(entries, distance))
    }

    /// Mapping entry whose segment contains video `time`
    pub fn mapping_by_time(&self, time: f64) -> Option<&'a MappingEntry> {
        let entries = self.entries()?;
        if !time.is_finite() || time < 0.0 {
            return None;
        }
        entries.get(Self::index_by_time(entries, time))
    }

    /// Recorded speed (km/h) at `distance`
    pub fn recorded_speed_at(&self, distance: f64) -> Option<f64> {
        self.mapping_by_distance(distance).map(|e| e.speed)
    }

    /// Video time showing route position `distance`
    pub fn video_time_by_position(&self, distance: f64) -> Option<f64> {
        let entries = self.entries()?;
        let distance = self.lap_relative(distance)?;
        let last = entries.last()?;

        if self.route.is_loop() && distance >= self.route.total_distance() {
            return Some(last.time);
        }

        let idx = Self::index_by_distance(entries, distance);
        let entry = &entries[idx];
        let next = entries.get(idx + 1);

        let time = if entry.speed > 0.0 {
            let t = entry.time + (distance - entry.distance) / (entry.speed / KMH_PER_MS);
            next.map_or(t, |n| t.min(n.time))
        } else {
            match next {
                Some(n) if n.distance > entry.distance => {
                    let f = (distance - entry.distance) / (n.distance - entry.distance);
                    entry.time + (n.time - entry.time) * f
                }
                _ => entry.time,
            }
        };
        Some(time.max(0.0))
    }

    /// Route position shown at video `time`
    pub fn position_by_video_time(&self, time: f64) -> Option<f64> {
        let entries = self.entries()?;
        if !time.is_finite() || time < 0.0 {
            return None;
        }

        let idx = Self::index_by_time(entries, time);
        let entry = &entries[idx];
        let next = entries.get(idx + 1);

        let distance = if entry.speed > 0.0 {
            let d = entry.distance + (time - entry.time) * entry.speed / KMH_PER_MS;
            next.map_or(d, |n| d.min(n.distance))
        } else {
            match next {
                Some(n) if n.time > entry.time => {
                    let f = (time - entry.time) / (n.time - entry.time);
                    entry.distance + (n.distance - entry.distance) * f
                }
                _ => entry.distance,
            }
        };
        Some(distance.clamp(0.0, self.route.total_distance()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VideoMapping;

    /// 1000m loop recorded at 36 km/h (10 m/s) for the first half, 18 km/h after
    fn video_route() -> Route {
        let points = vec![
            RoutePoint::at(0.0, 0.0),
            RoutePoint::at(500.0, 4.0),
            RoutePoint::at(900.0, -2.0),
        ];
        let mapping = VideoMapping::new(vec![
            MappingEntry { time: 0.0, distance: 0.0, speed: 36.0, frame: 0 },
            MappingEntry { time: 50.0, distance: 500.0, speed: 18.0, frame: 1500 },
            MappingEntry { time: 150.0, distance: 1000.0, speed: 18.0, frame: 4500 },
        ])
        .unwrap();
        Route::new("video", points)
            .unwrap()
            .with_total_distance(1000.0)
            .with_loop(true)
            .with_video(mapping)
    }

    #[test]
    fn test_video_time_at_start_is_zero() {
        let route = video_route();
        assert_eq!(RouteIndex::new(&route).video_time_by_position(0.0), Some(0.0));
    }

    #[test]
    fn test_interpolates_with_recorded_speed() {
        let route = video_route();
        let index = RouteIndex::new(&route);
        assert!((index.video_time_by_position(250.0).unwrap() - 25.0).abs() < 1e-9);
        assert!((index.video_time_by_position(600.0).unwrap() - 70.0).abs() < 1e-9);
        assert!((index.position_by_video_time(70.0).unwrap() - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_interior_distances() {
        let route = video_route();
        let index = RouteIndex::new(&route);
        for d in [1.0, 123.4, 499.9, 500.0, 731.0, 999.0] {
            let t = index.video_time_by_position(d).unwrap();
            let back = index.position_by_video_time(t).unwrap();
            assert!((back - d).abs() < 1e-6, "{} -> {} -> {}", d, t, back);
        }
    }

    #[test]
    fn test_loop_wraps_positions() {
        let route = video_route();
        let index = RouteIndex::new(&route);
        let base = index.video_time_by_position(321.0).unwrap();
        let wrapped = index.video_time_by_position(1321.0).unwrap();
        assert!((base - wrapped).abs() < 1e-9);
    }

    #[test]
    fn test_end_of_loop_uses_last_entry() {
        let route = video_route();
        assert_eq!(RouteIndex::new(&route).video_time_by_position(1000.0), Some(150.0));
    }

    #[test]
    fn test_missing_data_is_none() {
        let route = Route::new("plain", vec![RoutePoint::at(0.0, 0.0), RoutePoint::at(100.0, 0.0)])
            .unwrap()
            .with_loop(false);
        let index = RouteIndex::new(&route);
        assert_eq!(index.video_time_by_position(10.0), None);
        assert_eq!(index.mapping_by_time(1.0), None);
        assert_eq!(index.point_index_at(150.0), None);
        assert_eq!(index.lap_relative(-1.0), None);
    }

    #[test]
    fn test_mapping_lookups() {
        let route = video_route();
        let index = RouteIndex::new(&route);
        assert_eq!(index.mapping_by_distance(750.0).unwrap().frame, 1500);
        assert_eq!(index.mapping_by_time(10.0).unwrap().frame, 0);
        assert_eq!(index.recorded_speed_at(499.0), Some(36.0));
    }

    #[test]
    fn test_position_at_interpolates_points() {
        let points = vec![
            RoutePoint { lat: 47.0, lng: 8.0, elevation: 400.0, ..RoutePoint::at(0.0, 5.0) },
            RoutePoint { lat: 47.01, lng: 8.0, elevation: 450.0, ..RoutePoint::at(1000.0, 0.0) },
        ];
        let route = Route::new("line", points).unwrap().with_loop(false);
        let p = RouteIndex::new(&route).position_at(250.0).unwrap();
        assert!((p.lat - 47.0025).abs() < 1e-9);
        assert!((p.elevation - 412.5).abs() < 1e-9);
        assert_eq!(p.slope, 5.0);
    }
}
