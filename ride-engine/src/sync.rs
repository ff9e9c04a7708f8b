//! Video ↔ route synchronization
//!
//! The video player and the ride tick report independently. Each report
//! updates its own status; both statuses are then projected to a common
//! instant and compared. When the positions agree the playback rate follows
//! the ratio of rider speed to recorded speed; when they drift apart the rate
//! is pushed up or down so the gap closes over `catch_up_time`, and gaps too
//! large to close smoothly become a seek.

use crate::config::SyncConfig;
use chrono::{DateTime, Utc};
use ride_core::clock::{seconds_between, Clock, SystemClock};
use ride_core::model::{ActivityStatus, PlaybackStatus};
use ride_core::units::KMH_PER_MS;
use ride_core::{Route, RouteIndex};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Instruction for the video player
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerCommand {
    /// Change the playback rate
    Rate { rate: f64 },
    /// Jump to a video time (seconds)
    Seek { time: f64 },
}

pub type CommandListener = Box<dyn FnMut(&PlayerCommand) + Send + Sync>;

/// Serializable synchronizer state for the API
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub playback: Option<PlaybackStatus>,
    pub activity: Option<ActivityStatus>,
    pub rate: f64,
    /// Video position minus rider position at the last reconciliation (meters)
    pub delta: Option<f64>,
    pub loop_mode: bool,
}

pub struct VideoSynchronizer {
    route: Arc<Route>,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    loop_mode: bool,
    start_position: f64,
    playback: Option<PlaybackStatus>,
    activity: Option<ActivityStatus>,
    rate: f64,
    delta: Option<f64>,
    last_correction: Option<DateTime<Utc>>,
    listeners: Vec<CommandListener>,
}

impl VideoSynchronizer {
    /// Loop mode follows the route's own loop flag
    pub fn new(route: Arc<Route>, start_position: f64) -> Self {
        let loop_mode = route.is_loop();
        Self {
            route,
            config: SyncConfig::default(),
            clock: Arc::new(SystemClock),
            loop_mode,
            start_position,
            playback: None,
            activity: None,
            rate: 1.0,
            delta: None,
            last_correction: None,
            listeners: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_loop_mode(mut self, loop_mode: bool) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    /// Register a listener for every command this synchronizer issues
    pub fn subscribe(&mut self, listener: CommandListener) {
        self.listeners.push(listener);
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn start_position(&self) -> f64 {
        self.start_position
    }

    /// Video time the player should open at
    pub fn start_time(&self) -> Option<f64> {
        RouteIndex::new(&self.route).video_time_by_position(self.start_position)
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            playback: self.playback,
            activity: self.activity,
            rate: self.rate,
            delta: self.delta,
            loop_mode: self.loop_mode,
        }
    }

    /// Forget both timelines, e.g. when the ride restarts
    pub fn reset(&mut self, start_position: f64) {
        self.start_position = start_position;
        self.playback = None;
        self.activity = None;
        self.rate = 1.0;
        self.delta = None;
        self.last_correction = None;
    }

    /// The player reports its play head
    pub fn on_video_playback_update(&mut self, time: f64, rate: f64) -> Option<PlayerCommand> {
        let index = RouteIndex::new(&self.route);
        let Some(route_distance) = index.position_by_video_time(time) else {
            debug!(time, "video time outside mapping");
            return None;
        };
        let speed = index.mapping_by_time(time).map(|e| e.speed).unwrap_or(0.0);

        self.playback = Some(PlaybackStatus {
            timestamp: self.clock.now(),
            rate,
            time,
            route_distance,
            speed,
        });
        self.rate = rate;
        self.on_update()
    }

    /// The ride tick reports the rider's route distance; speed is derived
    /// from the previous report.
    pub fn on_activity_update(&mut self, route_distance: f64) -> Option<PlayerCommand> {
        let now = self.clock.now();
        let distance = self.normalize(route_distance)?;

        let derived = self.activity.and_then(|prev| {
            let dt = seconds_between(prev.timestamp, now);
            let dd = distance - prev.route_distance;
            (dt > 0.0 && dd >= 0.0).then(|| dd / dt * KMH_PER_MS)
        });
        let speed = derived
            .or_else(|| self.activity.map(|prev| prev.speed))
            .or_else(|| RouteIndex::new(&self.route).recorded_speed_at(distance))
            .unwrap_or(0.0);

        self.record_activity(distance, speed, now)
    }

    /// The ride tick reports the rider's route distance and speed (km/h)
    pub fn on_activity_update_with_speed(
        &mut self,
        route_distance: f64,
        speed: f64,
    ) -> Option<PlayerCommand> {
        let now = self.clock.now();
        let distance = self.normalize(route_distance)?;
        self.record_activity(distance, speed.max(0.0), now)
    }

    fn record_activity(
        &mut self,
        route_distance: f64,
        speed: f64,
        now: DateTime<Utc>,
    ) -> Option<PlayerCommand> {
        self.activity = Some(ActivityStatus {
            timestamp: now,
            route_distance,
            speed,
        });
        self.on_update()
    }

    /// Lap-reduce (in loop mode) and clamp to the route
    fn normalize(&self, route_distance: f64) -> Option<f64> {
        if !route_distance.is_finite() {
            return None;
        }
        let total = self.route.total_distance();
        let distance = if self.loop_mode && route_distance > total && total > 0.0 {
            route_distance.rem_euclid(total)
        } else {
            route_distance
        };
        Some(distance.clamp(0.0, total))
    }

    /// Compare both timelines and decide on a player command
    fn on_update(&mut self) -> Option<PlayerCommand> {
        let (video, activity) = (self.playback?, self.activity?);

        let now = video.timestamp.max(activity.timestamp);
        let video_now = video.route_distance
            + video.speed / KMH_PER_MS * video.rate * seconds_between(video.timestamp, now);
        let activity_now = activity.route_distance
            + activity.speed / KMH_PER_MS * seconds_between(activity.timestamp, now);

        let mut delta = video_now - activity_now;
        let total = self.route.total_distance();
        if self.loop_mode && total > 0.0 {
            // shortest way around the loop
            if delta > total / 2.0 {
                delta -= total;
            } else if delta < -total / 2.0 {
                delta += total;
            }
        }
        self.delta = Some(delta);

        let command = if delta.abs() <= self.config.position_tolerance {
            self.match_speed(&video, &activity)
        } else {
            self.correct(delta, &video, &activity, activity_now, now)
        };
        let command = command?;

        if let PlayerCommand::Rate { rate } = command {
            self.rate = rate;
        }
        for listener in self.listeners.iter_mut() {
            listener(&command);
        }
        Some(command)
    }

    /// Positions agree: play at the rider's speed relative to the recording
    fn match_speed(
        &self,
        video: &PlaybackStatus,
        activity: &ActivityStatus,
    ) -> Option<PlayerCommand> {
        if video.speed <= 0.0 {
            return None;
        }
        let rate = self.config.clamp_rate(activity.speed / video.speed);
        if (rate - self.rate).abs() < self.config.rate_tolerance {
            return None;
        }
        debug!(rate, "playback rate follows rider speed");
        Some(PlayerCommand::Rate { rate })
    }

    /// Positions differ: steer the rate so the gap closes over `catch_up_time`
    fn correct(
        &mut self,
        delta: f64,
        video: &PlaybackStatus,
        activity: &ActivityStatus,
        activity_now: f64,
        now: DateTime<Utc>,
    ) -> Option<PlayerCommand> {
        if let Some(last) = self.last_correction {
            let since_ms = seconds_between(last, now) * 1000.0;
            if since_ms < self.config.max_rate_update_ms as f64 {
                return None;
            }
        }

        if delta.abs() > self.config.seek_threshold {
            let time = RouteIndex::new(&self.route).video_time_by_position(activity_now)?;
            info!(delta, time, "video too far from rider, seeking");
            self.last_correction = Some(now);
            return Some(PlayerCommand::Seek { time });
        }

        if video.speed <= 0.0 {
            return None;
        }
        let target_ms = activity.speed / KMH_PER_MS - delta / self.config.catch_up_time;
        let rate = self.config.clamp_rate(target_ms / (video.speed / KMH_PER_MS));
        if (rate - self.rate).abs() < self.config.rate_tolerance {
            return None;
        }

        debug!(delta, rate, "correcting playback rate");
        self.last_correction = Some(now);
        Some(PlayerCommand::Rate { rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ride_core::{MappingEntry, ManualClock, RoutePoint, VideoMapping};

    fn route() -> Arc<Route> {
        let mapping = VideoMapping::new(vec![
            MappingEntry { time: 0.0, distance: 0.0, speed: 36.0, frame: 0 },
            MappingEntry { time: 100.0, distance: 1000.0, speed: 36.0, frame: 3000 },
        ])
        .unwrap();
        Arc::new(
            Route::new("sync", vec![RoutePoint::at(0.0, 0.0), RoutePoint::at(1000.0, 0.0)])
                .unwrap()
                .with_loop(true)
                .with_video(mapping),
        )
    }

    #[test]
    fn test_no_command_until_both_sides_reported() {
        let mut sync = VideoSynchronizer::new(route(), 0.0).with_clock(Arc::new(ManualClock::default()));
        assert_eq!(sync.on_video_playback_update(10.0, 1.0), None);
        assert!(sync.status().activity.is_none());
    }

    #[test]
    fn test_start_time_from_start_position() {
        let sync = VideoSynchronizer::new(route(), 250.0);
        assert_eq!(sync.start_time(), Some(25.0));
    }

    #[test]
    fn test_activity_position_wraps_in_loop_mode() {
        let mut sync = VideoSynchronizer::new(route(), 0.0).with_clock(Arc::new(ManualClock::default()));
        sync.on_activity_update_with_speed(1250.0, 36.0);
        assert_eq!(sync.status().activity.unwrap().route_distance, 250.0);

        let mut open = VideoSynchronizer::new(route(), 0.0)
            .with_loop_mode(false)
            .with_clock(Arc::new(ManualClock::default()));
        open.on_activity_update_with_speed(1250.0, 36.0);
        assert_eq!(open.status().activity.unwrap().route_distance, 1000.0);
    }
}
