//! Tank Battle Simulation - headless real-time tank combat
//!
//! Runs the frame loop against headless collaborators. It handles:
//! - Offline matches driven by an autopilot
//! - Host matches mirrored to an in-process peer over the wire protocol
//! - Graceful shutdown on Ctrl+C, a run time limit, or game over

mod collab;
mod config;
mod game;
mod net;
mod util;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::collab::{AssetCatalog, AutoPilot, HeadlessRenderer, LogAudio};
use crate::config::Config;
use crate::game::{Collaborators, GameMatch, MatchHandle, MatchSettings, MatchSummary};
use crate::net::transport::{self, channel_pair};
use crate::net::{Inbox, NetRole};
use crate::util::time::{Clock, SystemClock};

/// Wire id of the in-process mirror peer
const MIRROR_PEER_ID: &str = "peer-1";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    let seed = config.seed.unwrap_or_else(rand::random);
    info!("Starting Tank Battle Simulation");
    info!(
        role = ?config.net_role,
        players = config.local_players,
        max_enemies = config.max_enemies,
        fps = config.target_fps,
        seed,
        "Simulation configured"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let settings = MatchSettings::from_config(&config, seed);

    let (primary, primary_handle, mirror) = match config.net_role {
        NetRole::Host => {
            let ((host_transport, host_rx), (peer_transport, peer_rx)) = channel_pair();
            let host_inbox = Inbox::new();
            let peer_inbox = Inbox::new();
            tokio::spawn(transport::pump(host_rx, host_inbox.clone(), config.peer_rate_limit));
            tokio::spawn(transport::pump(peer_rx, peer_inbox.clone(), config.peer_rate_limit));

            let (host, host_handle) = GameMatch::new(
                settings.clone(),
                headless(seed, settings.local_players),
                clock.clone(),
            );
            let host = host.with_network(Box::new(host_transport), host_inbox);

            let peer_settings = MatchSettings {
                role: NetRole::Peer,
                player_id: MIRROR_PEER_ID.to_string(),
                local_players: 1,
                seed: seed.wrapping_add(1),
                // The host decides when the run is over
                stop_on_game_over: false,
                ..settings.clone()
            };
            let (peer, peer_handle) = GameMatch::new(
                peer_settings,
                headless(seed.wrapping_add(1), 1),
                clock.clone(),
            );
            let peer = peer.with_network(Box::new(peer_transport), peer_inbox);

            info!(peer = MIRROR_PEER_ID, "Mirror peer connected in-process");
            (
                tokio::spawn(host.run()),
                host_handle,
                Some((tokio::spawn(peer.run()), peer_handle)),
            )
        }
        NetRole::Offline | NetRole::Peer => {
            let (game, handle) =
                GameMatch::new(settings.clone(), headless(seed, settings.local_players), clock);
            (tokio::spawn(game.run()), handle, None)
        }
    };

    spawn_hud_logger(&primary_handle);

    let summary = wait_for_end(primary, &primary_handle, run_limit(config.run_seconds)).await?;
    log_summary("primary", &summary);

    if let Some((task, handle)) = mirror {
        handle.stop();
        let summary = task.await?;
        log_summary(MIRROR_PEER_ID, &summary);
    }

    info!("Simulation shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Autopilot input with headless render and audio
fn headless(seed: u64, players: usize) -> Collaborators {
    Collaborators {
        input: Box::new(AutoPilot::new(seed, players)),
        renderer: Box::new(HeadlessRenderer::new(AssetCatalog::with_defaults())),
        audio: Box::new(LogAudio::default()),
    }
}

/// Resolves after `seconds`, never when zero
async fn run_limit(seconds: u64) {
    if seconds == 0 {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        info!(seconds, "Run time limit reached");
    }
}

/// Wait for the match to end on its own, a shutdown signal, or the time limit
async fn wait_for_end(
    mut task: JoinHandle<MatchSummary>,
    handle: &MatchHandle,
    limit: impl Future<Output = ()>,
) -> anyhow::Result<MatchSummary> {
    let finished = tokio::select! {
        result = &mut task => Some(result),
        _ = shutdown_signal() => None,
        _ = limit => None,
    };

    match finished {
        Some(result) => Ok(result?),
        None => {
            handle.stop();
            Ok(task.await?)
        }
    }
}

/// Log stage and phase changes from the HUD feed
fn spawn_hud_logger(handle: &MatchHandle) {
    let mut rx = handle.subscribe();
    tokio::spawn(async move {
        let mut last: Option<(u32, &'static str)> = None;
        loop {
            match rx.recv().await {
                Ok(hud) => {
                    if last != Some((hud.stage, hud.phase)) {
                        info!(
                            stage = hud.stage,
                            phase = hud.phase,
                            score = hud.score,
                            lives = ?hud.lives,
                            "HUD"
                        );
                        last = Some((hud.stage, hud.phase));
                    } else {
                        debug!(
                            score = hud.score,
                            remaining = hud.enemies_remaining,
                            alive = hud.enemies_alive,
                            boss = hud.boss_battle,
                            remote = hud.remote_players,
                            "HUD"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "HUD logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn log_summary(name: &str, summary: &MatchSummary) {
    info!(
        instance = name,
        frames = summary.frames,
        failed_frames = summary.failed_frames,
        stage = summary.stage,
        score = summary.score,
        phase = ?summary.phase,
        "Match finished"
    );
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
