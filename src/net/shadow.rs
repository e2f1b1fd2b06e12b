//! Display-only mirrors of remote players

use std::collections::HashMap;

use tracing::debug;

use super::protocol::PlayerStateData;

/// Entries older than this are hidden from rendering (ms)
pub const STALE_AFTER_MS: f64 = 1000.0;

const DEFAULT_HEALTH: i32 = 100;
const DEFAULT_LIVES: i32 = 4;
const REMOTE_SPRITES: [&str; 2] = ["player2", "player3"];

/// Last known state of a remote player. Never simulated.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayerShadow {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub direction: u8,
    pub facing: u8,
    pub rotation: f64,
    pub health: i32,
    pub lives: i32,
    pub alive: bool,
    pub respawning: bool,
    /// Local receive time (ms)
    pub last_update: f64,
}

impl RemotePlayerShadow {
    fn from_state(id: &str, data: &PlayerStateData, now_ms: f64) -> Self {
        Self {
            id: id.to_string(),
            x: data.x,
            y: data.y,
            direction: data.direction.unwrap_or(0),
            facing: data.facing.unwrap_or(0),
            rotation: data.rotation.unwrap_or(0.0),
            health: data.health.unwrap_or(DEFAULT_HEALTH),
            lives: data.lives.unwrap_or(DEFAULT_LIVES),
            alive: data.alive,
            respawning: data.respawning,
            last_update: now_ms,
        }
    }

    /// Field-wise overwrite; absent optionals keep their value
    fn apply(&mut self, data: &PlayerStateData, now_ms: f64) {
        self.x = data.x;
        self.y = data.y;
        self.direction = data.direction.unwrap_or(self.direction);
        self.facing = data.facing.unwrap_or(self.facing);
        self.rotation = data.rotation.unwrap_or(self.rotation);
        self.health = data.health.unwrap_or(self.health);
        self.lives = data.lives.unwrap_or(self.lives);
        self.alive = data.alive;
        self.respawning = data.respawning;
        self.last_update = now_ms;
    }

    pub fn is_stale(&self, now_ms: f64) -> bool {
        now_ms - self.last_update > STALE_AFTER_MS
    }

    pub fn is_visible(&self, now_ms: f64) -> bool {
        self.alive && !self.respawning && !self.is_stale(now_ms)
    }

    /// Stable sprite pick per player id
    pub fn sprite(&self) -> &'static str {
        let hash = self
            .id
            .encode_utf16()
            .fold(0i32, |h, c| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32));
        REMOTE_SPRITES[hash.unsigned_abs() as usize % REMOTE_SPRITES.len()]
    }

    /// Short overlay label, `P` plus the id's last three characters
    pub fn label(&self) -> String {
        let tail: String = {
            let chars: Vec<char> = self.id.chars().collect();
            chars[chars.len().saturating_sub(3)..].iter().collect()
        };
        format!("P{tail}")
    }
}

/// Remote player id -> shadow
#[derive(Debug, Clone, Default)]
pub struct ShadowMap {
    entries: HashMap<String, RemotePlayerShadow>,
}

impl ShadowMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert if absent, otherwise overwrite field by field
    pub fn update_or_create(&mut self, id: &str, data: &PlayerStateData, now_ms: f64) {
        match self.entries.get_mut(id) {
            Some(shadow) => shadow.apply(data, now_ms),
            None => {
                debug!(player_id = %id, "Tracking new remote player");
                self.entries
                    .insert(id.to_string(), RemotePlayerShadow::from_state(id, data, now_ms));
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&RemotePlayerShadow> {
        self.entries.get(id)
    }

    /// Shadows to draw at `now_ms`, ordered by id
    pub fn visible(&self, now_ms: f64) -> Vec<&RemotePlayerShadow> {
        let mut shown: Vec<&RemotePlayerShadow> = self
            .entries
            .values()
            .filter(|s| s.is_visible(now_ms))
            .collect();
        shown.sort_by(|a, b| a.id.cmp(&b.id));
        shown
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(x: f64) -> PlayerStateData {
        PlayerStateData {
            x,
            y: 50.0,
            alive: true,
            ..Default::default()
        }
    }

    #[test]
    fn insert_uses_defaults_then_overwrites_fieldwise() {
        let mut map = ShadowMap::new();
        map.update_or_create("peer-1", &state(10.0), 0.0);
        let s = map.get("peer-1").expect("created");
        assert_eq!(s.health, 100);
        assert_eq!(s.lives, 4);
        assert_eq!(s.direction, 0);

        let update = PlayerStateData {
            lives: Some(2),
            direction: Some(3),
            ..state(20.0)
        };
        map.update_or_create("peer-1", &update, 10.0);
        map.update_or_create("peer-1", &state(30.0), 20.0);
        let s = map.get("peer-1").expect("present");
        assert_eq!(s.x, 30.0);
        assert_eq!(s.lives, 2);
        assert_eq!(s.direction, 3);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn zero_values_overwrite() {
        let mut map = ShadowMap::new();
        map.update_or_create("p", &state(0.0), 0.0);
        let update = PlayerStateData {
            health: Some(0),
            ..state(0.0)
        };
        map.update_or_create("p", &update, 1.0);
        assert_eq!(map.get("p").map(|s| s.health), Some(0));
    }

    #[test]
    fn stale_entries_are_hidden_but_kept() {
        let mut map = ShadowMap::new();
        map.update_or_create("p", &state(1.0), 5_000.0);
        assert_eq!(map.visible(5_999.0).len(), 1);
        assert!(map.visible(6_001.0).is_empty());
        assert!(map.get("p").is_some());

        // A fresh update brings it back
        map.update_or_create("p", &state(2.0), 6_001.0);
        assert_eq!(map.visible(6_002.0).len(), 1);
    }

    #[test]
    fn dead_or_respawning_shadows_are_not_drawn() {
        let mut map = ShadowMap::new();
        map.update_or_create("a", &PlayerStateData { alive: false, ..state(1.0) }, 0.0);
        map.update_or_create("b", &PlayerStateData { respawning: true, ..state(1.0) }, 0.0);
        map.update_or_create("c", &state(1.0), 0.0);
        let ids: Vec<&str> = map.visible(10.0).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn sprite_and_label_are_stable() {
        let s = RemotePlayerShadow::from_state("player_abc123", &state(0.0), 0.0);
        assert_eq!(s.sprite(), s.clone().sprite());
        assert!(REMOTE_SPRITES.contains(&s.sprite()));
        assert_eq!(s.label(), "P123");
        let short = RemotePlayerShadow::from_state("x", &state(0.0), 0.0);
        assert_eq!(short.label(), "Px");
    }
}
