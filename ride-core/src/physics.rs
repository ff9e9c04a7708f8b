//! Power/speed integrator for a rider on a slope
//!
//! The integrator steps kinetic energy forward: the difference between the
//! rider's power and the power needed to hold the current velocity is added
//! to (or drained from) the kinetic energy over the step. Speeds are km/h at
//! the interface and m/s internally.

use crate::units::KMH_PER_MS;

/// Gaps at least this long are treated as a restart, not integrated (seconds)
pub const RESET_INTERVAL: f64 = 30.0;

/// Step size used by iterative callers (seconds)
pub const DEFAULT_STEP: f64 = 1.0;

const GRAVITY: f64 = 9.81;
const AIR_DENSITY: f64 = 1.2041;
const DEFAULT_CWA: f64 = 0.4;
const DEFAULT_CRR: f64 = 0.0036;
const MAX_VELOCITY: f64 = 100.0; // m/s, bracket for the terminal speed search

/// Resistance model converting between power and steady velocity
pub trait ResistanceModel {
    /// Power (W) needed to hold `velocity` (m/s) on `slope` (%) with `mass` (kg)
    fn power_for_velocity(&self, velocity: f64, slope: f64, mass: f64) -> f64;

    /// Steady velocity (m/s) reached with constant `power` (W)
    fn velocity_for_power(&self, power: f64, slope: f64, mass: f64) -> f64 {
        terminal_velocity(self, power, slope, mass)
    }
}

/// Gravity, rolling resistance and aerodynamic drag on a road bike
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadResistance {
    /// Drag coefficient times frontal area (m²)
    pub cwa: f64,
    /// Rolling resistance coefficient
    pub crr: f64,
    /// Air density (kg/m³)
    pub rho: f64,
}

impl Default for RoadResistance {
    fn default() -> Self {
        Self {
            cwa: DEFAULT_CWA,
            crr: DEFAULT_CRR,
            rho: AIR_DENSITY,
        }
    }
}

impl ResistanceModel for RoadResistance {
    fn power_for_velocity(&self, velocity: f64, slope: f64, mass: f64) -> f64 {
        let angle = (slope / 100.0).atan();
        let climbing = mass * GRAVITY * angle.sin();
        let rolling = mass * GRAVITY * self.crr * angle.cos();
        let drag = 0.5 * self.rho * self.cwa * velocity * velocity;
        velocity * (climbing + rolling + drag)
    }
}

/// Solve `power_for_velocity(v) == power` for the steady velocity by bisection.
///
/// Below the root the model needs less than `power`, above it more, so the
/// bracket [0, hi] always converges. Returns 0 when no forward motion is
/// sustainable.
fn terminal_velocity<M: ResistanceModel + ?Sized>(
    model: &M,
    power: f64,
    slope: f64,
    mass: f64,
) -> f64 {
    let required = |v: f64| model.power_for_velocity(v, slope, mass);

    // Zero power on flat or uphill: nothing moves
    if power <= 0.0 && required(1e-3) >= power {
        return 0.0;
    }

    let mut hi = 1.0;
    while required(hi) < power && hi < MAX_VELOCITY {
        hi *= 2.0;
    }
    if required(hi) < power {
        return hi;
    }

    let mut lo = 0.0;
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        if required(mid) < power {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Result of one integration step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// km/h
    pub speed: f64,
    /// meters covered during the step
    pub distance: f64,
}

impl Motion {
    pub fn velocity(&self) -> f64 {
        self.speed / KMH_PER_MS
    }
}

/// Outcome of [`speed_and_distance`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Normal step
    Integrated(Motion),
    /// Step at least [`RESET_INTERVAL`] long: steady speed, no distance
    Reset(Motion),
    /// Speed or distance collapsed to zero; iterating further cannot progress
    Divergent,
}

/// Power required to reach a commanded speed, see [`power_and_distance`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerStep {
    /// W
    pub power: f64,
    /// meters covered during the step
    pub distance: f64,
}

fn kinetic_energy(mass: f64, velocity: f64) -> f64 {
    0.5 * mass * velocity * velocity
}

/// Advance a rider by `dt` seconds at constant `power`.
///
/// `slope` is in percent, `prev_velocity` in m/s, `mass` in kg. When the
/// power cannot sustain any motion during the step the velocity halves
/// instead of dropping through zero.
pub fn speed_and_distance<M: ResistanceModel + ?Sized>(
    model: &M,
    power: f64,
    slope: f64,
    prev_velocity: f64,
    mass: f64,
    dt: f64,
) -> Outcome {
    if dt >= RESET_INTERVAL {
        let v = model.velocity_for_power(power, slope, mass);
        return Outcome::Reset(Motion {
            speed: v * KMH_PER_MS,
            distance: 0.0,
        });
    }

    let prev_energy = kinetic_energy(mass, prev_velocity);
    let power_to_maintain = model.power_for_velocity(prev_velocity, slope, mass);
    let power_delta = power_to_maintain - power;
    let energy = prev_energy - power_delta * dt;

    let velocity = if energy > 0.0 {
        (2.0 * energy / mass).sqrt()
    } else {
        prev_velocity / 2.0
    };

    let motion = Motion {
        speed: velocity * KMH_PER_MS,
        distance: velocity * dt,
    };
    if motion.speed == 0.0 || motion.distance == 0.0 || !motion.speed.is_finite() {
        return Outcome::Divergent;
    }
    Outcome::Integrated(motion)
}

/// Inverse of [`speed_and_distance`]: the power needed to go from
/// `prev_velocity` (m/s) to `speed` (km/h) within `dt` seconds.
pub fn power_and_distance<M: ResistanceModel + ?Sized>(
    model: &M,
    speed: f64,
    slope: f64,
    prev_velocity: f64,
    mass: f64,
    dt: f64,
) -> PowerStep {
    let velocity = speed / KMH_PER_MS;
    let maintain = model.power_for_velocity(velocity, slope, mass);

    if dt >= RESET_INTERVAL || dt <= 0.0 {
        return PowerStep {
            power: maintain,
            distance: 0.0,
        };
    }

    let acceleration =
        (kinetic_energy(mass, velocity) - kinetic_energy(mass, prev_velocity)) / dt;
    PowerStep {
        power: maintain + acceleration,
        distance: velocity * dt,
    }
}
