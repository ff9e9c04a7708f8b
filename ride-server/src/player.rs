//! Simulated video player
//!
//! Stands in for the real video element: keeps a play head that advances at
//! the playback rate, obeys play/pause/seek/rate controls and the
//! synchronizer's commands, and reports its position back on every tick.

use crate::state::AppState;
use ride_engine::config::{MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
use ride_engine::PlayerCommand;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State of the simulated player
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPlayer {
    time: f64,
    duration: f64,
    rate: f64,
    playing: bool,
    looping: bool,
    min_rate: f64,
    max_rate: f64,
}

impl VideoPlayer {
    pub fn new(duration: f64, looping: bool) -> Self {
        Self {
            time: 0.0,
            duration: duration.max(0.0),
            rate: 1.0,
            playing: true,
            looping,
            min_rate: MIN_PLAYBACK_RATE,
            max_rate: MAX_PLAYBACK_RATE,
        }
    }

    /// Accept the same rate range the synchronizer works with
    pub fn with_rate_bounds(mut self, min_rate: f64, max_rate: f64) -> Self {
        self.min_rate = min_rate.min(max_rate);
        self.max_rate = max_rate.max(min_rate);
        self
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn seek(&mut self, time: f64) {
        self.time = time.clamp(0.0, self.duration);
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate.clamp(self.min_rate, self.max_rate);
    }

    pub fn apply(&mut self, command: &PlayerCommand) {
        match *command {
            PlayerCommand::Rate { rate } => self.set_rate(rate),
            PlayerCommand::Seek { time } => self.seek(time),
        }
    }

    /// Move the play head by `dt` seconds of wall time. Returns the new
    /// video time, or `None` while paused or once a non-looping video ends.
    pub fn advance(&mut self, dt: f64) -> Option<f64> {
        if !self.playing {
            return None;
        }

        let next = self.time + dt.max(0.0) * self.rate;
        if next >= self.duration {
            if self.looping && self.duration > 0.0 {
                self.time = next % self.duration;
            } else {
                self.time = self.duration;
                self.playing = false;
                return None;
            }
        } else {
            self.time = next;
        }
        Some(self.time)
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            time: self.time,
            duration: self.duration,
            rate: self.rate,
            playing: self.playing,
            looping: self.looping,
        }
    }
}

/// Serializable player info for the API
#[derive(Debug, Clone, Serialize)]
pub struct PlayerInfo {
    pub time: f64,
    pub duration: f64,
    pub rate: f64,
    pub playing: bool,
    pub looping: bool,
}

/// Start (or restart) the task that drives the player and reports its
/// position to the synchronizer
pub async fn start_player_task(state: AppState) {
    let cancel_token = {
        let mut cancel = state.player_cancel.write().await;
        if let Some(token) = cancel.take() {
            token.cancel();
        }
        let token = CancellationToken::new();
        *cancel = Some(token.clone());
        token
    };

    let mut commands = state.subscribe_commands();
    let tick = state.config.player_tick();

    tokio::spawn(async move {
        info!("Video player task started");
        let mut interval = tokio::time::interval(tick);
        let mut last = tokio::time::Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                command = commands.recv() => match command {
                    Ok(command) => {
                        let mut player = state.player.write().await;
                        match player.as_mut() {
                            Some(player) => {
                                debug!(?command, "player applying command");
                                player.apply(&command);
                            }
                            None => break,
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "player missed commands");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = interval.tick() => {
                    let now = tokio::time::Instant::now();
                    let dt = now.duration_since(last).as_secs_f64();
                    last = now;

                    let report = {
                        let mut player = state.player.write().await;
                        match player.as_mut() {
                            Some(player) => player.advance(dt).map(|time| (time, player.rate())),
                            None => break,
                        }
                    };

                    if let Some((time, rate)) = report {
                        state.report_playback(time, rate).await;
                    }
                }
            }
        }

        info!("Video player task ended");
    });
}

/// Stop the player task, if any
pub async fn stop_player_task(state: &AppState) {
    let mut cancel = state.player_cancel.write().await;
    if let Some(token) = cancel.take() {
        token.cancel();
    }
}
