//! Player tank: lives, respawn and invulnerability state machine

use tracing::info;

use super::combat::TankStats;
use super::entity::{CollisionLayer, LayerMask};
use super::tank::{BulletSpawn, Direction, PowerUpKind, Tank};
use super::vector::Vector2D;

pub const STARTING_LIVES: i32 = 4;
pub const RESPAWN_DURATION_MS: f64 = 3000.0;
pub const INVULNERABILITY_DURATION_MS: f64 = 2000.0;
/// Grace period after surviving a hit
pub const HIT_INVULNERABILITY_MS: f64 = 500.0;

/// Fixed spawn table for up to eight players
pub const PLAYER_SPAWN_POINTS: [(f64, f64); 8] = [
    (200.0, 420.0),
    (350.0, 420.0),
    (500.0, 420.0),
    (580.0, 420.0),
    (275.0, 350.0),
    (425.0, 350.0),
    (525.0, 350.0),
    (600.0, 350.0),
];

/// Held inputs for one player this frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
}

impl Controls {
    /// 4-way intent; vertical wins over horizontal, up over down, left over right
    pub fn move_vector(&self) -> Vector2D {
        if self.up {
            Vector2D::new(0.0, -1.0)
        } else if self.down {
            Vector2D::new(0.0, 1.0)
        } else if self.left {
            Vector2D::new(-1.0, 0.0)
        } else if self.right {
            Vector2D::new(1.0, 0.0)
        } else {
            Vector2D::ZERO
        }
    }
}

/// Lifecycle as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    Active,
    Invulnerable,
    Respawning,
    GameOver,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub tank: Tank,
    pub index: usize,
    pub lives: i32,
    pub score: u32,
    pub respawning: bool,
    /// Remaining respawn countdown (ms)
    pub respawn_time: f64,
    pub invulnerable: bool,
    /// Remaining invulnerability (ms)
    pub invulnerability_time: f64,
    pub spawn_point: Vector2D,
    pub controls: Controls,
    /// Debug switch, blocks all damage
    pub infinite_health: bool,
}

impl Player {
    pub fn new(x: f64, y: f64, index: usize) -> Self {
        let mask = LayerMask::of(&[
            CollisionLayer::Wall,
            CollisionLayer::Enemy,
            CollisionLayer::EnemyBullet,
            CollisionLayer::PowerUp,
            CollisionLayer::Destructible,
        ]);
        Self {
            tank: Tank::new(x, y, &TankStats::player(), CollisionLayer::Player, mask),
            index,
            lives: STARTING_LIVES,
            score: 0,
            respawning: false,
            respawn_time: 0.0,
            invulnerable: false,
            invulnerability_time: 0.0,
            spawn_point: Vector2D::new(x, y),
            controls: Controls::default(),
            infinite_health: false,
        }
    }

    /// Player at the spawn table slot for `index`
    pub fn at_spawn_slot(index: usize) -> Self {
        let (x, y) = PLAYER_SPAWN_POINTS
            .get(index)
            .copied()
            .unwrap_or(PLAYER_SPAWN_POINTS[0]);
        Self::new(x, y, index)
    }

    pub fn alive(&self) -> bool {
        self.tank.body.alive
    }

    pub fn phase(&self) -> PlayerPhase {
        if self.is_game_over() {
            PlayerPhase::GameOver
        } else if self.respawning {
            PlayerPhase::Respawning
        } else if self.invulnerable {
            PlayerPhase::Invulnerable
        } else {
            PlayerPhase::Active
        }
    }

    pub fn set_controls(&mut self, controls: Controls) {
        self.controls = controls;
    }

    /// Advance timers and movement; returns power-ups that expired
    pub fn update(&mut self, dt: f64) -> Vec<PowerUpKind> {
        if self.respawning {
            self.update_respawn(dt);
            return Vec::new();
        }

        if self.invulnerable {
            self.invulnerability_time -= dt * 1000.0;
            if self.invulnerability_time <= 0.0 {
                self.invulnerable = false;
                self.invulnerability_time = 0.0;
            }
        }

        self.tank.set_move_direction(self.controls.move_vector());
        self.tank.update(dt)
    }

    fn update_respawn(&mut self, dt: f64) {
        self.respawn_time -= dt * 1000.0;
        if self.respawn_time <= 0.0 {
            self.complete_respawn();
        }
    }

    /// Fire if the trigger is held and the tank allows it
    pub fn attempt_fire(&mut self, now_ms: f64) -> Option<BulletSpawn> {
        if self.respawning || !self.alive() || !self.controls.fire {
            return None;
        }
        self.tank.fire(now_ms)
    }

    /// Apply a hit. Returns true if it started a death transition.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if self.invulnerable || self.respawning || !self.alive() || self.infinite_health {
            return false;
        }
        if self.tank.power_ups.consume(PowerUpKind::Shield) {
            return false;
        }

        self.tank.body.health -= amount;
        if self.tank.body.health <= 0 {
            self.tank.body.health = 0;
            self.start_respawn();
            true
        } else {
            self.invulnerable = true;
            self.invulnerability_time = HIT_INVULNERABILITY_MS;
            false
        }
    }

    pub fn start_respawn(&mut self) {
        self.lives -= 1;
        info!(player = self.index, lives = self.lives, "Player destroyed");
        self.respawning = true;
        self.respawn_time = RESPAWN_DURATION_MS;
        self.tank.body.visible = false;
        self.tank.body.solid = false;
        self.reset_to_spawn_point();
    }

    pub fn complete_respawn(&mut self) {
        if self.lives <= 0 {
            info!(player = self.index, "Player out of lives");
            self.tank.body.alive = false;
            self.respawn_time = 0.0;
            return;
        }

        info!(player = self.index, lives = self.lives, "Player respawned");
        self.tank.body.alive = true;
        self.respawning = false;
        self.respawn_time = 0.0;
        self.tank.body.visible = true;
        self.tank.body.solid = true;
        self.tank.body.health = self.tank.body.max_health;
        self.invulnerable = true;
        self.invulnerability_time = INVULNERABILITY_DURATION_MS;
    }

    pub fn reset_to_spawn_point(&mut self) {
        self.tank.body.set_position(self.spawn_point.x, self.spawn_point.y);
        self.tank.direction = Direction::Up;
        self.tank.facing = Direction::Up;
        self.tank.body.velocity = Vector2D::ZERO;
        self.tank.stop_movement();
    }

    pub fn add_score(&mut self, points: u32) {
        self.score += points;
    }

    pub fn collect_power_up(&mut self, kind: PowerUpKind) {
        match kind {
            PowerUpKind::RapidFire => {
                self.tank.activate_power_up(kind, 15_000.0);
                self.add_score(100);
            }
            PowerUpKind::Shield => {
                self.tank.activate_power_up(kind, 10_000.0);
                self.add_score(150);
            }
            PowerUpKind::Speed => {
                self.tank.activate_power_up(kind, 12_000.0);
                self.add_score(100);
            }
            PowerUpKind::Piercing => {
                self.tank.activate_power_up(kind, 10_000.0);
                self.add_score(100);
            }
            PowerUpKind::ExtraLife => {
                self.lives += 1;
                self.add_score(500);
            }
        }
    }

    /// Permanently out of the match
    pub fn is_game_over(&self) -> bool {
        !self.alive() && self.lives <= 0
    }

    pub fn reset_for_new_game(&mut self) {
        self.lives = STARTING_LIVES;
        self.score = 0;
        self.tank.body.health = self.tank.body.max_health;
        self.tank.body.alive = true;
        self.tank.body.visible = true;
        self.tank.body.solid = true;
        self.respawning = false;
        self.respawn_time = 0.0;
        self.invulnerable = false;
        self.invulnerability_time = 0.0;
        self.tank.power_ups.clear();
        self.tank.active_bullet = None;
        self.tank.last_fire_time = None;
        self.reset_to_spawn_point();
    }
}
