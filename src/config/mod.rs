//! Configuration module - environment variable parsing

use std::env;
use std::str::FromStr;

use crate::game::director::DEFAULT_MAX_ENEMIES;
use crate::game::player::PLAYER_SPAWN_POINTS;
use crate::net::NetRole;
use crate::util::rate_limit::PEER_MESSAGE_RATE_LIMIT;
use crate::util::time::DEFAULT_TARGET_FPS;

/// Simulation configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Tick rate of the run loop
    pub target_fps: u32,
    /// Players created at every reset
    pub local_players: usize,
    pub max_players: usize,
    /// Default concurrent enemy cap
    pub max_enemies: usize,
    /// World RNG seed; random when unset
    pub seed: Option<u64>,
    /// Stop after this many seconds, 0 runs until game over or Ctrl+C
    pub run_seconds: u64,

    pub net_role: NetRole,
    /// Our id on the wire
    pub player_id: String,
    /// Inbound messages per second allowed from each peer
    pub peer_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` uses the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // One spawn slot per player
        let max_players: usize =
            parse_or(&lookup, "SIM_MAX_PLAYERS", PLAYER_SPAWN_POINTS.len())?;
        if max_players == 0 || max_players > PLAYER_SPAWN_POINTS.len() {
            return Err(ConfigError::Invalid("SIM_MAX_PLAYERS"));
        }

        let local_players: usize = parse_or(&lookup, "SIM_LOCAL_PLAYERS", 1)?;
        if local_players == 0 || local_players > max_players {
            return Err(ConfigError::Invalid("SIM_LOCAL_PLAYERS"));
        }

        let target_fps: u32 = parse_or(&lookup, "SIM_TARGET_FPS", DEFAULT_TARGET_FPS)?;
        if target_fps == 0 {
            return Err(ConfigError::Invalid("SIM_TARGET_FPS"));
        }

        let seed = match lookup("SIM_SEED") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("SIM_SEED"))?,
            ),
            None => None,
        };

        let net_role = match lookup("NET_ROLE").as_deref().map(str::trim) {
            None | Some("offline") => NetRole::Offline,
            Some("host") => NetRole::Host,
            Some(_) => return Err(ConfigError::Invalid("NET_ROLE")),
        };

        let player_id = lookup("NET_PLAYER_ID").unwrap_or_else(|| "host".to_string());
        if player_id.trim().is_empty() {
            return Err(ConfigError::Invalid("NET_PLAYER_ID"));
        }

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            target_fps,
            local_players,
            max_players,
            max_enemies: parse_or(&lookup, "SIM_MAX_ENEMIES", DEFAULT_MAX_ENEMIES)?,
            seed,
            run_seconds: parse_or(&lookup, "SIM_RUN_SECONDS", 0)?,
            net_role,
            player_id,
            peer_rate_limit: parse_or(&lookup, "NET_PEER_RATE_LIMIT", PEER_MESSAGE_RATE_LIMIT)?,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
