//! Application state management

use crate::config::ServerConfig;
use crate::player::VideoPlayer;
use ride_core::{adapter::RideAdapter, RideFrame, Route};
use ride_engine::{PlayerCommand, RemainingTimeEstimator, VideoSynchronizer};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything tied to the ride currently in progress
pub struct RideSession {
    /// Key of the adapter producing this ride
    pub adapter: String,
    pub route: Arc<Route>,
    pub estimator: RemainingTimeEstimator,
    pub synchronizer: VideoSynchronizer,
    pub last_frame: Option<RideFrame>,
    /// Last remaining-time estimate (seconds)
    pub remaining: Option<f64>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,

    /// All registered adapters
    pub adapters: Arc<RwLock<Vec<Box<dyn RideAdapter>>>>,

    /// Key of the currently active adapter
    pub active_adapter: Arc<RwLock<Option<String>>>,

    /// Ride in progress (None until an adapter starts)
    pub session: Arc<RwLock<Option<RideSession>>>,

    /// Broadcast channel for ride frames
    pub frame_tx: broadcast::Sender<RideFrame>,

    /// Broadcast channel for synchronizer commands to the video player
    pub command_tx: broadcast::Sender<PlayerCommand>,

    /// Simulated video player (None when the route has no video)
    pub player: Arc<RwLock<Option<VideoPlayer>>>,

    /// Cancellation token for the player task
    pub player_cancel: Arc<RwLock<Option<CancellationToken>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let (frame_tx, _) = broadcast::channel(100);
        let (command_tx, _) = broadcast::channel(32);

        Self {
            config: Arc::new(config),
            adapters: Arc::new(RwLock::new(Vec::new())),
            active_adapter: Arc::new(RwLock::new(None)),
            session: Arc::new(RwLock::new(None)),
            frame_tx,
            command_tx,
            player: Arc::new(RwLock::new(None)),
            player_cancel: Arc::new(RwLock::new(None)),
        }
    }

    /// Register an adapter
    pub async fn register_adapter(&self, adapter: Box<dyn RideAdapter>) {
        let mut adapters = self.adapters.write().await;
        adapters.push(adapter);
    }

    /// Subscribe to ride frames
    pub fn subscribe(&self) -> broadcast::Receiver<RideFrame> {
        self.frame_tx.subscribe()
    }

    /// Subscribe to player commands
    pub fn subscribe_commands(&self) -> broadcast::Receiver<PlayerCommand> {
        self.command_tx.subscribe()
    }

    /// Start a ride on `route`. Replaces any previous session and, when the
    /// route carries a video, cues the player at the start position.
    pub async fn begin_session(&self, adapter: &str, route: Arc<Route>) {
        let estimator = RemainingTimeEstimator::new(self.config.estimator.clone());
        let mut synchronizer =
            VideoSynchronizer::new(route.clone(), 0.0).with_config(self.config.sync.clone());

        let tx = self.command_tx.clone();
        synchronizer.subscribe(Box::new(move |command| {
            // no receivers just means nobody is playing the video
            let _ = tx.send(*command);
        }));

        let player = route.video().and_then(|video| {
            let duration = video.last()?.time;
            let mut player = VideoPlayer::new(duration, route.is_loop()).with_rate_bounds(
                self.config.sync.min_playback_rate,
                self.config.sync.max_playback_rate,
            );
            player.seek(synchronizer.start_time().unwrap_or(0.0));
            Some(player)
        });

        info!(
            adapter,
            route = route.name(),
            distance = route.total_distance(),
            video = player.is_some(),
            "Ride session started"
        );

        *self.player.write().await = player;
        *self.session.write().await = Some(RideSession {
            adapter: adapter.to_string(),
            route,
            estimator,
            synchronizer,
            last_frame: None,
            remaining: None,
        });
    }

    /// Drop the session and the player
    pub async fn end_session(&self) {
        crate::player::stop_player_task(self).await;
        *self.player.write().await = None;
        if self.session.write().await.take().is_some() {
            info!("Ride session ended");
        }
    }

    /// The player reports its play head to the synchronizer
    pub async fn report_playback(&self, time: f64, rate: f64) -> Option<PlayerCommand> {
        let mut session = self.session.write().await;
        session
            .as_mut()?
            .synchronizer
            .on_video_playback_update(time, rate)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
