//! Adapter lifecycle and ride tick
//!
//! This module handles:
//! - Polling adapters for availability
//! - Starting/stopping adapters and the ride session that goes with them
//! - Reading frames from the active adapter on every ride tick
//! - Feeding the estimator and the synchronizer, broadcasting frames

use crate::player::start_player_task;
use crate::state::AppState;
use anyhow::{Context, Result};
use ride_core::ActivitySource;
use ride_engine::DemoRide;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Main manager loop
pub async fn run(state: AppState) {
    match DemoRide::new() {
        Ok(demo) => {
            let demo = demo
                .with_power(state.config.demo_power)
                .with_rider_weight(state.config.rider_weight)
                .with_reality_factor(state.config.reality_factor);
            state.register_adapter(Box::new(demo)).await;
        }
        Err(e) => error!("Failed to build demo ride: {:#}", e),
    }

    info!("Adapter manager started");

    let mut last_detection: Option<Instant> = None;
    loop {
        let due = last_detection
            .map(|t| t.elapsed() >= state.config.detection_interval())
            .unwrap_or(true);
        if due {
            last_detection = Some(Instant::now());
            if let Err(e) = detection_cycle(&state).await {
                error!("Error in detection cycle: {:#}", e);
            }
        }

        if let Err(e) = ride_tick(&state).await {
            error!("Error in ride tick: {:#}", e);
        }

        sleep(state.config.ride_tick()).await;
    }
}

/// Check all adapters for availability
pub async fn detection_cycle(state: &AppState) -> Result<()> {
    let started = {
        let mut adapters = state.adapters.write().await;
        let mut active_adapter = state.active_adapter.write().await;

        // If we have an active adapter, check if it's still detected
        if let Some(ref active_key) = *active_adapter {
            if let Some(adapter) = adapters.iter_mut().find(|a| a.key() == active_key) {
                if !adapter.detect() {
                    info!("Source {} no longer detected, stopping adapter", active_key);
                    if let Err(e) = adapter.stop() {
                        error!("Error stopping adapter {}: {:#}", active_key, e);
                    }
                    *active_adapter = None;
                    drop(adapters);
                    drop(active_adapter);
                    state.end_session().await;
                }
                return Ok(());
            }
        }

        // No active adapter, look for a detected source
        let mut started = None;
        for adapter in adapters.iter_mut() {
            if adapter.detect() && !adapter.is_active() {
                info!("Source {} detected, starting adapter", adapter.name());
                match adapter
                    .start()
                    .with_context(|| format!("starting adapter {}", adapter.key()))
                {
                    Ok(()) => {
                        *active_adapter = Some(adapter.key().to_string());
                        started = Some((adapter.key().to_string(), adapter.route()));
                        break;
                    }
                    Err(e) => error!("{:#}", e),
                }
            }
        }
        started
    };

    if let Some((key, route)) = started {
        match route {
            Some(route) => {
                let has_video = route.video().is_some();
                state.begin_session(&key, route).await;
                if has_video {
                    start_player_task(state.clone()).await;
                }
            }
            None => warn!("Adapter {} has no route; rides will not be estimated", key),
        }
    }

    Ok(())
}

/// Read a frame from the active adapter, update the session and broadcast
pub async fn ride_tick(state: &AppState) -> Result<()> {
    let active_key = {
        let active = state.active_adapter.read().await;
        active.clone()
    };
    let Some(active_key) = active_key else {
        return Ok(());
    };

    let frame = {
        let mut adapters = state.adapters.write().await;
        let Some(adapter) = adapters.iter_mut().find(|a| a.key() == active_key) else {
            return Ok(());
        };
        match adapter.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Error reading frame from {}: {:#}", active_key, e);
                return Ok(());
            }
        }
    };

    {
        let mut session = state.session.write().await;
        if let Some(session) = session.as_mut() {
            let position = frame.route_distance.0;
            let power = frame.current_power();
            let speed = frame.current_speed();
            let route = session.route.clone();

            session.remaining =
                session
                    .estimator
                    .remaining_time(&frame, &route, position, power, speed, None);

            let command = match speed {
                Some(speed) => session
                    .synchronizer
                    .on_activity_update_with_speed(position, speed),
                None => session.synchronizer.on_activity_update(position),
            };
            if let Some(command) = command {
                debug!(?command, position, "synchronizer issued command");
            }
            session.last_frame = Some(frame.clone());
        }
    }

    // Ignore error if no receivers (they'll get the next frame)
    let _ = state.frame_tx.send(frame);
    Ok(())
}
