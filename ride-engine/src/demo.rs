//! Demo ride source that simulates a rider on a rolling-hills loop
//!
//! The loop is laid out on a circle so the start and end coordinates meet,
//! and carries a video mapping recorded by a steady rider. The simulated
//! rider pushes a slowly varying, jittered power and is moved along the
//! route with the physics integrator, so frames look like a real trainer
//! session without any hardware.

use anyhow::Result;
use chrono::Utc;
use ride_core::adapter::{RideAdapter, DEFAULT_EQUIPMENT_WEIGHT, DEFAULT_RIDER_WEIGHT};
use ride_core::error::RouteError;
use ride_core::physics::{speed_and_distance, Outcome, ResistanceModel, DEFAULT_STEP};
use ride_core::units::*;
use ride_core::{
    MappingEntry, RideFrame, RoadResistance, Route, RouteIndex, RoutePoint, VideoMapping,
};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

// =============================================================================
// Route definition: a sequence of hills that form one lap
// =============================================================================

#[derive(Clone, Copy)]
struct HillSegment {
    length: f64, // meters
    slope: f64,  // percent
}

/// ~3.8km loop; climbs and descents cancel out so the lap closes
fn demo_hills() -> Vec<HillSegment> {
    vec![
        // Start/finish flat
        HillSegment { length: 400.0, slope: 0.0 },
        // First climb, steepening
        HillSegment { length: 300.0, slope: 2.5 },
        HillSegment { length: 400.0, slope: 4.0 },
        HillSegment { length: 200.0, slope: 1.0 },
        // Descent
        HillSegment { length: 500.0, slope: -3.0 },
        HillSegment { length: 300.0, slope: -1.5 },
        // False flat and second climb
        HillSegment { length: 600.0, slope: 0.5 },
        HillSegment { length: 350.0, slope: 3.0 },
        // Run back to the line
        HillSegment { length: 250.0, slope: -2.0 },
        HillSegment { length: 500.0, slope: -2.9 },
    ]
}

const POINT_SPACING: f64 = 50.0;
const BASE_ELEVATION: f64 = 420.0;
const CENTER: (f64, f64) = (47.37, 8.54);
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Power of the rider who filmed the route (W)
const RECORDING_POWER: f64 = 220.0;
const RECORDING_SPEED_RANGE: (f64, f64) = (10.0, 60.0); // km/h
const RECORDING_FPS: f64 = 30.0;

const DEFAULT_POWER: f64 = 180.0;

fn slope_at(hills: &[HillSegment], distance: f64) -> f64 {
    let mut start = 0.0;
    for hill in hills {
        if distance < start + hill.length {
            return hill.slope;
        }
        start += hill.length;
    }
    hills.last().map(|h| h.slope).unwrap_or(0.0)
}

/// Build the demo loop with its recorded video
pub fn demo_route() -> Result<Route, RouteError> {
    let hills = demo_hills();
    let total: f64 = hills.iter().map(|h| h.length).sum();
    let radius = total / TAU;
    let model = RoadResistance::default();
    let mass = DEFAULT_RIDER_WEIGHT + DEFAULT_EQUIPMENT_WEIGHT;

    let count = (total / POINT_SPACING).round() as usize;
    let mut points = Vec::with_capacity(count + 1);
    let mut elevation = BASE_ELEVATION;
    let mut video_time = 0.0;

    for i in 0..=count {
        let distance = i as f64 * POINT_SPACING;
        let slope = slope_at(&hills, distance.min(total - POINT_SPACING));
        let angle = distance / total * TAU;
        let north = radius * (1.0 - angle.cos());
        let east = radius * angle.sin();

        let recorded = (model.velocity_for_power(RECORDING_POWER, slope, mass) * KMH_PER_MS)
            .clamp(RECORDING_SPEED_RANGE.0, RECORDING_SPEED_RANGE.1);

        points.push(RoutePoint {
            lat: CENTER.0 + north / METERS_PER_DEGREE,
            lng: CENTER.1 + east / (METERS_PER_DEGREE * CENTER.0.to_radians().cos()),
            elevation,
            slope,
            route_distance: distance,
            distance: if i == 0 { 0.0 } else { POINT_SPACING },
            video_time: Some(video_time),
            video_speed: Some(recorded),
        });

        elevation += slope / 100.0 * POINT_SPACING;
        video_time += POINT_SPACING / (recorded / KMH_PER_MS);
    }

    let entries = points
        .iter()
        .filter_map(|p| {
            Some(MappingEntry {
                time: p.video_time?,
                distance: p.route_distance,
                speed: p.video_speed?,
                frame: (p.video_time? * RECORDING_FPS).round() as u32,
            })
        })
        .collect();
    let video = VideoMapping::new(entries)?;

    Ok(Route::new("Demo Hills", points)?.with_video(video))
}

/// Simple deterministic noise from a seed
fn noise(seed: f64) -> f64 {
    let x = (seed * 12.9898 + 78.233).sin() * 43_758.547;
    x - x.floor()
}

/// Small jitter centered around 0
fn jitter(seed: f64, amplitude: f64) -> f64 {
    (noise(seed) - 0.5) * 2.0 * amplitude
}

// =============================================================================
// DemoRide
// =============================================================================

pub struct DemoRide {
    active: bool,
    route: Arc<Route>,
    model: RoadResistance,
    start_time: Option<Instant>,
    last_read: f64,
    frame_count: u64,

    base_power: f64,
    rider_weight: f64,
    reality_factor: f64,

    elapsed: f64,
    distance: f64,
    velocity: f64,
    power: f64,
    work: f64,
}

impl DemoRide {
    pub fn new() -> Result<Self> {
        Ok(Self::with_route(Arc::new(demo_route()?)))
    }

    /// Ride an arbitrary route instead of the demo loop
    pub fn with_route(route: Arc<Route>) -> Self {
        Self {
            active: false,
            route,
            model: RoadResistance::default(),
            start_time: None,
            last_read: 0.0,
            frame_count: 0,
            base_power: DEFAULT_POWER,
            rider_weight: DEFAULT_RIDER_WEIGHT,
            reality_factor: 100.0,
            elapsed: 0.0,
            distance: 0.0,
            velocity: 0.0,
            power: 0.0,
            work: 0.0,
        }
    }

    pub fn with_power(mut self, watts: f64) -> Self {
        self.base_power = watts.max(0.0);
        self
    }

    pub fn with_rider_weight(mut self, kg: f64) -> Self {
        self.rider_weight = kg;
        self
    }

    pub fn with_reality_factor(mut self, percent: f64) -> Self {
        self.reality_factor = Percentage::new(percent).0;
        self
    }

    /// Rider position along the route (not lap-reduced)
    pub fn distance(&self) -> f64 {
        self.distance
    }

    fn mass(&self) -> f64 {
        self.rider_weight + DEFAULT_EQUIPMENT_WEIGHT
    }

    fn rider_power(&self) -> f64 {
        let n = self.frame_count as f64;
        let swell = 0.15 * self.base_power * (self.elapsed / 45.0).sin();
        (self.base_power + swell + jitter(n, 0.06 * self.base_power)).max(0.0)
    }

    fn slope_here(&self) -> f64 {
        let index = RouteIndex::new(&self.route);
        let slope = index
            .lap_relative(self.distance)
            .and_then(|d| index.position_at(d))
            .map(|p| p.slope)
            .unwrap_or(0.0);
        slope * self.reality_factor / 100.0
    }

    /// Move the rider forward by `dt` seconds of simulated time and return
    /// the resulting frame.
    pub fn advance(&mut self, dt: f64) -> RideFrame {
        self.frame_count += 1;
        self.power = self.rider_power();

        let mut left = dt.max(0.0);
        while left > 0.0 {
            let step = left.min(DEFAULT_STEP);
            let outcome = speed_and_distance(
                &self.model,
                self.power,
                self.slope_here(),
                self.velocity,
                self.mass(),
                step,
            );
            match outcome {
                Outcome::Integrated(motion) => {
                    self.velocity = motion.velocity();
                    self.distance += motion.distance;
                }
                Outcome::Reset(motion) => self.velocity = motion.velocity(),
                Outcome::Divergent => {
                    debug!(distance = self.distance, "demo rider stalled");
                    self.velocity = 0.0;
                }
            }
            left -= step;
        }

        if !self.route.is_loop() {
            self.distance = self.distance.min(self.route.total_distance());
        }
        self.elapsed += dt.max(0.0);
        self.work += self.power * dt.max(0.0);

        self.frame()
    }

    fn frame(&self) -> RideFrame {
        let average = (self.elapsed > 0.0).then(|| Watts(self.work / self.elapsed));
        RideFrame {
            timestamp: Utc::now(),
            source: self.key().to_string(),
            elapsed_time: Seconds(self.elapsed),
            power: Some(Watts(self.power)),
            average_power: average,
            speed: Some(MetersPerSecond(self.velocity).to_kmh()),
            route_distance: Meters(self.distance),
            reality_factor: Percentage(self.reality_factor),
            rider_weight: Kilograms(self.rider_weight),
            equipment_weight: Kilograms(DEFAULT_EQUIPMENT_WEIGHT),
        }
    }
}

impl RideAdapter for DemoRide {
    fn key(&self) -> &str {
        "demo"
    }

    fn name(&self) -> &str {
        "Demo Ride"
    }

    fn detect(&self) -> bool {
        true
    }

    fn start(&mut self) -> Result<()> {
        self.active = true;
        self.start_time = Some(Instant::now());
        self.last_read = 0.0;
        self.frame_count = 0;
        self.elapsed = 0.0;
        self.distance = 0.0;
        self.velocity = 0.0;
        self.work = 0.0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        self.start_time = None;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RideFrame>> {
        if !self.active {
            return Ok(None);
        }

        let now = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let dt = now - self.last_read;
        self.last_read = now;

        Ok(Some(self.advance(dt)))
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn route(&self) -> Option<Arc<Route>> {
        Some(self.route.clone())
    }
}
