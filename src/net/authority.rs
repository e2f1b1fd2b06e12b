//! Host authority: who decides spawns and kills, and what gets mirrored

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::protocol::NetMsg;
use crate::game::world::GameEvent;

/// Delay between a host reset and the baseline broadcast (ms)
pub const FULL_SYNC_DELAY_MS: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetRole {
    /// Single instance, no transport
    #[default]
    Offline,
    /// Runs the director and broadcasts its decisions
    Host,
    /// Mirrors the host
    Peer,
}

impl NetRole {
    pub fn is_multiplayer(self) -> bool {
        self != NetRole::Offline
    }

    /// Offline and host instances decide spawns, kills and drops
    pub fn is_authoritative(self) -> bool {
        self != NetRole::Peer
    }
}

/// Turns world events into outbound messages according to the role
#[derive(Debug, Clone)]
pub struct NetworkAuthority {
    pub role: NetRole,
    pub player_id: String,
    outbox: Vec<NetMsg>,
    full_sync_at: Option<f64>,
}

impl NetworkAuthority {
    pub fn new(role: NetRole, player_id: impl Into<String>) -> Self {
        Self {
            role,
            player_id: player_id.into(),
            outbox: Vec::new(),
            full_sync_at: None,
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == NetRole::Host
    }

    pub fn runs_director(&self) -> bool {
        self.role.is_authoritative()
    }

    /// Peers take spawn/kill/destruction orders only from the host
    pub fn accepts_authority_events(&self) -> bool {
        self.role == NetRole::Peer
    }

    /// Echoes of our own shots are dropped
    pub fn accepts_bullet_from(&self, player_id: &str) -> bool {
        player_id != self.player_id
    }

    /// Queue the messages this role owes peers for `events`
    pub fn observe(&mut self, events: &[GameEvent]) {
        if !self.role.is_multiplayer() {
            return;
        }
        let host = self.is_host();

        for event in events {
            let msg = match *event {
                GameEvent::BulletFired {
                    net_id,
                    kind,
                    local_player: Some(_),
                    position,
                    direction,
                    ..
                } => Some(NetMsg::BulletFired {
                    bullet_id: net_id,
                    player_id: self.player_id.clone(),
                    kind,
                    x: position.x,
                    y: position.y,
                    dir_x: direction.x,
                    dir_y: direction.y,
                }),
                GameEvent::EnemySpawned {
                    net_id,
                    enemy_type,
                    position,
                } if host => Some(NetMsg::EnemySpawned {
                    enemy_id: net_id,
                    enemy_type,
                    x: position.x,
                    y: position.y,
                }),
                GameEvent::EnemyDestroyed { net_id, .. } if host => {
                    Some(NetMsg::EnemyKilled { enemy_id: net_id })
                }
                GameEvent::DestructibleDestroyed { id, kind, .. } if host => {
                    Some(NetMsg::DestructibleDestroyed { id, kind })
                }
                _ => None,
            };
            if let Some(msg) = msg {
                self.outbox.push(msg);
            }
        }
    }

    pub fn queue(&mut self, msg: NetMsg) {
        if self.role.is_multiplayer() {
            self.outbox.push(msg);
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<NetMsg> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Host only: broadcast a baseline once the stage has settled
    pub fn schedule_full_sync(&mut self, now_ms: f64) {
        if self.is_host() {
            self.full_sync_at = Some(now_ms + FULL_SYNC_DELAY_MS);
            debug!(due_ms = now_ms + FULL_SYNC_DELAY_MS, "Full game state sync scheduled");
        }
    }

    /// True once when a scheduled sync comes due
    pub fn take_full_sync_due(&mut self, now_ms: f64) -> bool {
        match self.full_sync_at {
            Some(due) if now_ms >= due => {
                self.full_sync_at = None;
                info!(player_id = %self.player_id, "Sending full game state");
                true
            }
            _ => false,
        }
    }
}
