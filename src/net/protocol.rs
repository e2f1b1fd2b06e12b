//! Peer-to-peer message definitions
//! These are the wire types exchanged between host and peers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::bullet::BulletKind;
use crate::game::enemy::EnemyType;
use crate::game::stage::DestructibleKind;
use crate::util::time::unix_millis;

/// Network layer errors
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Transport channel closed")]
    ChannelClosed,

    #[error("Transport queue full, message dropped")]
    Backpressure,

    #[error("Peer {0} exceeded the message rate limit")]
    RateLimited(String),
}

/// Messages exchanged between participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetMsg {
    /// A local player fired; peers create an ownerless mirror
    BulletFired {
        bullet_id: Uuid,
        player_id: String,
        kind: BulletKind,
        /// Muzzle point (bullet center)
        x: f64,
        y: f64,
        dir_x: f64,
        dir_y: f64,
    },

    /// Host spawned an enemy
    EnemySpawned {
        enemy_id: Uuid,
        enemy_type: EnemyType,
        /// Top-left corner
        x: f64,
        y: f64,
    },

    /// Host confirmed an enemy kill
    EnemyKilled {
        enemy_id: Uuid,
    },

    /// Host confirmed a prop was destroyed
    DestructibleDestroyed {
        id: u32,
        kind: DestructibleKind,
    },

    /// Periodic position/health of one player
    PlayerState {
        player_id: String,
        state: PlayerStateData,
    },

    /// Host baseline for late or reconnecting peers
    FullGameState {
        state: FullGameState,
    },
}

impl NetMsg {
    pub fn name(&self) -> &'static str {
        match self {
            NetMsg::BulletFired { .. } => "bullet_fired",
            NetMsg::EnemySpawned { .. } => "enemy_spawned",
            NetMsg::EnemyKilled { .. } => "enemy_killed",
            NetMsg::DestructibleDestroyed { .. } => "destructible_destroyed",
            NetMsg::PlayerState { .. } => "player_state",
            NetMsg::FullGameState { .. } => "full_game_state",
        }
    }

    /// Spawn, kill, destruction and baseline messages decided by the host
    pub fn is_authority(&self) -> bool {
        matches!(
            self,
            NetMsg::EnemySpawned { .. }
                | NetMsg::EnemyKilled { .. }
                | NetMsg::DestructibleDestroyed { .. }
                | NetMsg::FullGameState { .. }
        )
    }
}

/// Player attributes mirrored to peers.
///
/// Optional fields keep the previous value on the receiver when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateData {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub direction: Option<u8>,
    #[serde(default)]
    pub facing: Option<u8>,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub health: Option<i32>,
    #[serde(default)]
    pub lives: Option<i32>,
    pub alive: bool,
    pub respawning: bool,
}

/// Enemy entry in a full sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyState {
    pub enemy_id: Uuid,
    pub enemy_type: EnemyType,
    pub x: f64,
    pub y: f64,
    pub health: i32,
    pub direction: u8,
}

/// Everything a peer needs to line up with the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullGameState {
    pub stage: u32,
    pub total_enemies_killed: u32,
    pub enemies_needed_to_win: u32,
    pub boss_battle_phase: bool,
    pub enemies: Vec<EnemyState>,
    /// Layout ids of props still standing
    pub destructibles: Vec<u32>,
    /// Host's own players, keyed by network id
    pub players: Vec<(String, PlayerStateData)>,
}

/// Wire wrapper carrying the sender id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    /// Sender wall time (ms)
    pub sent_at: u64,
    pub msg: NetMsg,
}

impl Envelope {
    pub fn new(from: impl Into<String>, msg: NetMsg) -> Self {
        Self {
            from: from.into(),
            sent_at: unix_millis(),
            msg,
        }
    }

    pub fn encode(&self) -> Result<String, NetError> {
        serde_json::to_string(self).map_err(NetError::Encode)
    }

    pub fn decode(raw: &str) -> Result<Self, NetError> {
        serde_json::from_str(raw).map_err(NetError::Decode)
    }
}
