//! Remaining ride time estimation
//!
//! A full estimate walks the route from the rider's position to the end (or
//! to a requested end position), integrating the physics model in fixed steps
//! per segment. That is too slow to run on every dashboard refresh, so the
//! result is cached and, until the update interval expires, answered by
//! counting the cached value down with wall time.

use crate::config::EstimatorConfig;
use crate::error::SimulationError;
use chrono::{DateTime, Utc};
use ride_core::clock::{seconds_between, Clock, SystemClock};
use ride_core::physics::{self, Outcome, ResistanceModel, RoadResistance};
use ride_core::units::KMH_PER_MS;
use ride_core::{ActivitySource, Route, RouteIndex};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Positions closer than this are considered equal (meters)
const POSITION_EPSILON: f64 = 1e-6;

/// Last full computation, counted down between recomputations
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RemainingTimeCache {
    /// Seconds remaining at the time of computation
    pub remaining: f64,
    /// Route length the computation ran against
    pub total_distance: f64,
    /// Lap the rider was on (always 0 unless riding an open-ended loop)
    pub lap: u64,
    pub end_pos: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

/// One segment boundary of the last simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectionPoint {
    /// Route distance (meters, lap-relative unless an end position was given)
    pub position: f64,
    /// Simulated seconds from the rider's position to here
    pub time_since_start: f64,
    /// Simulated speed on arrival (km/h)
    pub speed: f64,
    /// Simulated seconds from here to the end
    pub remaining: f64,
}

pub struct RemainingTimeEstimator {
    config: EstimatorConfig,
    model: Box<dyn ResistanceModel + Send + Sync>,
    clock: Arc<dyn Clock>,
    cache: Option<RemainingTimeCache>,
    projection: Vec<ProjectionPoint>,
}

impl RemainingTimeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            model: Box::new(RoadResistance::default()),
            clock: Arc::new(SystemClock),
            cache: None,
            projection: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_model(mut self, model: Box<dyn ResistanceModel + Send + Sync>) -> Self {
        self.model = model;
        self
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&RemainingTimeCache> {
        self.cache.as_ref()
    }

    /// Segment boundaries of the last full simulation
    pub fn projection(&self) -> &[ProjectionPoint] {
        &self.projection
    }

    /// Drop the cache and the last projection
    pub fn reset(&mut self) {
        self.cache = None;
        self.projection.clear();
    }

    /// Seconds left until the end of the route (or lap, or `end_pos`).
    ///
    /// `power` defaults to the activity's average power and `speed` (km/h) to
    /// its current speed. Returns `None` whenever no sensible answer exists:
    /// no power, a stalled simulation, a finished ride, or any internal error.
    pub fn remaining_time(
        &mut self,
        activity: &dyn ActivitySource,
        route: &Route,
        route_pos: f64,
        power: Option<f64>,
        speed: Option<f64>,
        end_pos: Option<f64>,
    ) -> Option<f64> {
        let now = self.clock.now();
        match self.evaluate(activity, route, route_pos, power, speed, end_pos, now) {
            Ok(remaining) => remaining,
            Err(e) if e.is_divergence() => {
                debug!(error = %e, route_pos, "no remaining time estimate");
                None
            }
            Err(e) => {
                warn!(error = %e, route = route.name(), route_pos, "remaining time estimate failed");
                None
            }
        }
    }

    /// Interpolated remaining time at `position` from the last projection
    pub fn remaining_at(&self, position: f64) -> Option<f64> {
        let first = self.projection.first()?;
        let last = self.projection.last()?;
        if position < first.position || position > last.position {
            return None;
        }
        let after = self.projection.partition_point(|p| p.position <= position);
        let a = &self.projection[after.saturating_sub(1)];
        match self.projection.get(after) {
            Some(b) if b.position > a.position => {
                let f = (position - a.position) / (b.position - a.position);
                Some(a.remaining + (b.remaining - a.remaining) * f)
            }
            _ => Some(a.remaining),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &mut self,
        activity: &dyn ActivitySource,
        route: &Route,
        route_pos: f64,
        power: Option<f64>,
        speed: Option<f64>,
        end_pos: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>, SimulationError> {
        let total = route.total_distance();
        if total <= 0.0 || route.points().is_empty() {
            return Err(SimulationError::EmptyRoute);
        }
        if !route_pos.is_finite() || route_pos < 0.0 {
            return Err(SimulationError::OffRoute {
                position: route_pos,
            });
        }

        let requested = power.or_else(|| activity.average_power());
        let calc_power = requested
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or(SimulationError::NoPower { power: requested })?;

        if end_pos.is_none() && !route.is_loop() && route_pos > total {
            debug!(route_pos, total, "rider past the end of the route");
            self.reset();
            return Ok(None);
        }

        let lap = match end_pos {
            None if route.is_loop() => (route_pos / total).floor() as u64,
            _ => 0,
        };

        if let Some(cached) = self.cached(activity, total, lap, end_pos, now) {
            return Ok(cached);
        }

        let (start, end) = match end_pos {
            Some(end) if route.is_loop() => (route_pos, end),
            Some(end) => (route_pos, end.min(total)),
            None if route.is_loop() => (route_pos.rem_euclid(total), total),
            None => (route_pos, total),
        };
        if end - start <= POSITION_EPSILON {
            debug!(route_pos, end, "rider at or past the end");
            self.reset();
            return Ok(None);
        }

        let initial_velocity = speed
            .or_else(|| activity.current_speed())
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| s / KMH_PER_MS)
            .unwrap_or(0.0);

        let mut series = self.simulate(
            route,
            start,
            end,
            calc_power,
            initial_velocity,
            activity.total_mass(),
            activity.reality_factor(),
        )?;

        let total_time = series.last().map(|p| p.time_since_start).unwrap_or(0.0);
        for point in series.iter_mut() {
            point.remaining = total_time - point.time_since_start;
        }

        let remaining = series.first().map(|p| p.remaining).unwrap_or(0.0);
        debug!(
            route = route.name(),
            start,
            end,
            power = calc_power,
            remaining,
            segments = series.len(),
            "recomputed remaining time"
        );

        self.cache = Some(RemainingTimeCache {
            remaining,
            total_distance: total,
            lap,
            end_pos,
            computed_at: now,
        });
        self.projection = series;
        Ok(Some(remaining))
    }

    /// Answer from the cache if it is still valid and fresh.
    ///
    /// An invalid cache (other route length, other lap, other end position) is
    /// dropped; a stale one is left for the recomputation to replace.
    fn cached(
        &mut self,
        activity: &dyn ActivitySource,
        total: f64,
        lap: u64,
        end_pos: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<Option<f64>> {
        let cache = self.cache?;

        if (cache.total_distance - total).abs() > POSITION_EPSILON
            || cache.lap != lap
            || cache.end_pos != end_pos
        {
            debug!(
                cached_total = cache.total_distance,
                total,
                cached_lap = cache.lap,
                lap,
                "remaining time cache invalidated"
            );
            self.reset();
            return None;
        }

        let elapsed = seconds_between(cache.computed_at, now);
        if elapsed >= self.config.update_interval(activity.elapsed_time()) {
            return None;
        }

        let remaining = cache.remaining - elapsed;
        Some((remaining >= 0.0).then_some(remaining))
    }

    /// Walk the route from `start` to `end` segment by segment.
    ///
    /// The walk keeps the point index and the lap count itself; segment ends
    /// are `lap * total + next point`, so it never re-searches a position
    /// that rounding left a hair short of a point.
    #[allow(clippy::too_many_arguments)]
    fn simulate(
        &self,
        route: &Route,
        start: f64,
        end: f64,
        power: f64,
        initial_velocity: f64,
        mass: f64,
        reality_factor: f64,
    ) -> Result<Vec<ProjectionPoint>, SimulationError> {
        let index = RouteIndex::new(route);
        let points = route.points();
        let total = route.total_distance();
        let scale = reality_factor.clamp(0.0, 100.0) / 100.0;

        let mut lap = if route.is_loop() {
            (start / total).floor()
        } else {
            0.0
        };
        let relative = (start - lap * total).clamp(0.0, total);
        let mut idx = index
            .point_index_at(relative)
            .ok_or(SimulationError::OffRoute { position: start })?;

        let mut series = Vec::new();
        let mut position = start;
        let mut time = 0.0;
        let mut velocity = initial_velocity;

        while end - position > POSITION_EPSILON {
            if series.len() >= self.config.max_segments {
                return Err(SimulationError::SegmentLimit {
                    segments: series.len(),
                });
            }

            let next = points
                .get(idx + 1)
                .map(|p| p.route_distance)
                .unwrap_or(total);
            let segment_end = (lap * total + next).min(end);
            let length = segment_end - position;

            if length > POSITION_EPSILON {
                series.push(ProjectionPoint {
                    position,
                    time_since_start: time,
                    speed: velocity * KMH_PER_MS,
                    remaining: 0.0,
                });

                let slope = points[idx].slope * scale;
                let (duration, v) =
                    self.integrate_segment(power, slope, velocity, mass, length, position)?;
                time += duration;
                velocity = v;
                position = segment_end;
            }

            if idx + 1 < points.len() {
                idx += 1;
            } else if route.is_loop() {
                idx = 0;
                lap += 1.0;
            } else {
                break;
            }
        }

        series.push(ProjectionPoint {
            position: end,
            time_since_start: time,
            speed: velocity * KMH_PER_MS,
            remaining: 0.0,
        });
        Ok(series)
    }

    /// Integrate over one segment of `length` meters; returns (seconds, final velocity).
    fn integrate_segment(
        &self,
        power: f64,
        slope: f64,
        mut velocity: f64,
        mass: f64,
        length: f64,
        position: f64,
    ) -> Result<(f64, f64), SimulationError> {
        let step = self.config.step;
        let mut left = length;
        let mut time = 0.0;

        for _ in 0..self.config.max_steps_per_segment {
            match physics::speed_and_distance(&*self.model, power, slope, velocity, mass, step) {
                Outcome::Integrated(motion) => {
                    velocity = motion.velocity();
                    if motion.distance >= left {
                        // partial last step
                        time += left / velocity;
                        return Ok((time, velocity));
                    }
                    time += step;
                    left -= motion.distance;
                }
                Outcome::Reset(_) | Outcome::Divergent => {
                    return Err(SimulationError::Divergent {
                        position: position + length - left,
                    });
                }
            }
        }

        Err(SimulationError::StepLimit {
            position,
            steps: self.config.max_steps_per_segment,
        })
    }
}

impl Default for RemainingTimeEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ride_core::units::Watts;
    use ride_core::{ManualClock, RideFrame, RoutePoint};

    fn flat_loop(total: f64) -> Route {
        Route::new("flat", vec![RoutePoint::at(0.0, 0.0)])
            .unwrap()
            .with_total_distance(total)
            .with_loop(true)
    }

    fn estimator(clock: &ManualClock) -> RemainingTimeEstimator {
        RemainingTimeEstimator::default().with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn test_projection_counts_down_to_zero() {
        let clock = ManualClock::default();
        let mut est = estimator(&clock);
        let route = flat_loop(1000.0);
        let frame = RideFrame::default();

        let remaining = est
            .remaining_time(&frame, &route, 0.0, Some(200.0), None, None)
            .unwrap();
        let projection = est.projection();
        assert_eq!(projection.first().unwrap().remaining, remaining);
        assert_eq!(projection.last().unwrap().remaining, 0.0);
        assert_eq!(projection.last().unwrap().position, 1000.0);
    }

    #[test]
    fn test_average_power_used_when_power_missing() {
        let clock = ManualClock::default();
        let route = flat_loop(1000.0);
        let frame = RideFrame {
            average_power: Some(Watts(200.0)),
            ..Default::default()
        };

        let from_avg = estimator(&clock).remaining_time(&frame, &route, 0.0, None, None, None);
        let explicit =
            estimator(&clock).remaining_time(&frame, &route, 0.0, Some(200.0), None, None);
        assert!(from_avg.is_some());
        assert_eq!(from_avg, explicit);
    }

    #[test]
    fn test_no_power_at_all_is_none() {
        let clock = ManualClock::default();
        let route = flat_loop(1000.0);
        let frame = RideFrame::default();
        assert_eq!(
            estimator(&clock).remaining_time(&frame, &route, 0.0, None, None, None),
            None
        );
    }

    #[test]
    fn test_remaining_at_interpolates_projection() {
        let clock = ManualClock::default();
        let mut est = estimator(&clock);
        let points = vec![
            RoutePoint::at(0.0, 0.0),
            RoutePoint::at(500.0, 0.0),
            RoutePoint::at(1000.0, 0.0),
        ];
        let route = Route::new("three", points).unwrap().with_loop(false);
        let frame = RideFrame::default();

        let total = est
            .remaining_time(&frame, &route, 0.0, Some(200.0), Some(30.0), None)
            .unwrap();
        let half = est.remaining_at(500.0).unwrap();
        assert!(half > 0.0 && half < total);
        assert_eq!(est.remaining_at(1000.0), Some(0.0));
        assert_eq!(est.remaining_at(1500.0), None);
    }

    #[test]
    fn test_step_limit_guards_stalled_segment() {
        let clock = ManualClock::default();
        let config = EstimatorConfig {
            max_steps_per_segment: 5,
            ..Default::default()
        };
        let mut est = RemainingTimeEstimator::new(config).with_clock(Arc::new(clock));
        let route = flat_loop(10_000.0);
        let frame = RideFrame::default();
        // 10km in 5 one-second steps is impossible at 100W
        assert_eq!(est.remaining_time(&frame, &route, 0.0, Some(100.0), None, None), None);
        assert!(est.cache().is_none());
    }
}
