//! Shared tank capability: 4-way movement, single-slot firing, power-ups

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;

use super::arena::Handle;
use super::bullet::BulletKind;
use super::combat::{BulletStats, TankStats};
use super::entity::{CollisionLayer, Entity, LayerMask};
use super::vector::Vector2D;

/// Fire rate while `rapidFire` is active (ms)
pub const RAPID_FIRE_RATE_MS: f64 = 150.0;
/// Movement speed while `speed` is active (px/s)
pub const SPEED_BOOST: f64 = 120.0;
/// Power-up duration when none is given (ms)
pub const DEFAULT_POWER_UP_MS: f64 = 10_000.0;
/// Distance from tank center to the muzzle
pub const BARREL_LENGTH: f64 = 20.0;

/// Cardinal facing; indices 0..3 are up/right/down/left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Out-of-range indices fall back to up
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => Direction::Right,
            2 => Direction::Down,
            3 => Direction::Left,
            _ => Direction::Up,
        }
    }

    pub fn unit(self) -> Vector2D {
        match self {
            Direction::Up => Vector2D::new(0.0, -1.0),
            Direction::Right => Vector2D::new(1.0, 0.0),
            Direction::Down => Vector2D::new(0.0, 1.0),
            Direction::Left => Vector2D::new(-1.0, 0.0),
        }
    }

    /// Dominant axis of a movement vector; ties resolve vertically
    pub fn from_vector(v: Vector2D) -> Option<Self> {
        if v.is_zero() {
            return None;
        }
        if v.x.abs() > v.y.abs() {
            Some(if v.x > 0.0 { Direction::Right } else { Direction::Left })
        } else {
            Some(if v.y > 0.0 { Direction::Down } else { Direction::Up })
        }
    }

    /// Sprite rotation for renderers (sprites face down by default)
    pub fn rotation(self) -> f64 {
        match self {
            Direction::Up => PI,
            Direction::Right => 3.0 * PI / 2.0,
            Direction::Down => 0.0,
            Direction::Left => PI / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerUpKind {
    RapidFire,
    Piercing,
    Shield,
    Speed,
    ExtraLife,
}

/// Active power-ups with their remaining time; presence means active
#[derive(Debug, Clone, Default)]
pub struct PowerUps {
    timers: HashMap<PowerUpKind, f64>,
}

impl PowerUps {
    pub fn activate(&mut self, kind: PowerUpKind, duration_ms: f64) {
        self.timers.insert(kind, duration_ms);
    }

    pub fn is_active(&self, kind: PowerUpKind) -> bool {
        self.timers.contains_key(&kind)
    }

    pub fn remaining_ms(&self, kind: PowerUpKind) -> Option<f64> {
        self.timers.get(&kind).copied()
    }

    /// Deactivate `kind`, returning whether it was active
    pub fn consume(&mut self, kind: PowerUpKind) -> bool {
        self.timers.remove(&kind).is_some()
    }

    /// Count every timer down; returns the kinds that expired
    pub fn tick(&mut self, dt_secs: f64) -> Vec<PowerUpKind> {
        let mut expired = Vec::new();
        for (kind, remaining) in self.timers.iter_mut() {
            *remaining -= dt_secs * 1000.0;
            if *remaining <= 0.0 {
                expired.push(*kind);
            }
        }
        for kind in &expired {
            self.timers.remove(kind);
        }
        expired
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    pub fn active(&self) -> impl Iterator<Item = PowerUpKind> + '_ {
        self.timers.keys().copied()
    }
}

/// Everything needed to create a bullet; the caller owns slot bookkeeping
#[derive(Debug, Clone, Copy)]
pub struct BulletSpawn {
    /// Muzzle point, the bullet is centered here
    pub position: Vector2D,
    pub direction: Vector2D,
    pub kind: BulletKind,
    pub piercing: bool,
}

#[derive(Debug, Clone)]
pub struct Tank {
    pub body: Entity,
    pub direction: Direction,
    /// Render alias of `direction`
    pub facing: Direction,
    pub base_speed: f64,
    pub base_fire_rate_ms: f64,
    /// Simulation time of the last shot (ms)
    pub last_fire_time: Option<f64>,
    /// At most one live bullet per tank
    pub active_bullet: Option<Handle>,
    pub bullet: BulletKind,
    pub barrel_length: f64,
    pub move_dir: Vector2D,
    pub is_moving: bool,
    pub power_ups: PowerUps,
}

impl Tank {
    pub fn new(x: f64, y: f64, stats: &TankStats, layer: CollisionLayer, mask: LayerMask) -> Self {
        let body = Entity::new(x, y, stats.size, stats.size)
            .with_layer(layer, mask)
            .with_health(stats.max_health);

        Self {
            body,
            direction: Direction::Up,
            facing: Direction::Up,
            base_speed: stats.speed,
            base_fire_rate_ms: stats.fire_rate_ms,
            last_fire_time: None,
            active_bullet: None,
            bullet: stats.bullet,
            barrel_length: BARREL_LENGTH,
            move_dir: Vector2D::ZERO,
            is_moving: false,
            power_ups: PowerUps::default(),
        }
    }

    pub fn speed(&self) -> f64 {
        if self.power_ups.is_active(PowerUpKind::Speed) {
            self.base_speed.max(SPEED_BOOST)
        } else {
            self.base_speed
        }
    }

    pub fn fire_rate_ms(&self) -> f64 {
        if self.power_ups.is_active(PowerUpKind::RapidFire) {
            self.base_fire_rate_ms.min(RAPID_FIRE_RATE_MS)
        } else {
            self.base_fire_rate_ms
        }
    }

    pub fn center(&self) -> Vector2D {
        self.body.center()
    }

    pub fn set_move_direction(&mut self, dir: Vector2D) {
        self.move_dir = dir;
    }

    pub fn stop_movement(&mut self) {
        self.move_dir = Vector2D::ZERO;
    }

    /// Turn the movement intent into facing and velocity
    pub fn update_movement(&mut self) {
        match Direction::from_vector(self.move_dir) {
            Some(direction) => {
                self.is_moving = true;
                self.direction = direction;
                self.facing = direction;
                self.body.velocity = self.move_dir.normalize() * self.speed();
            }
            None => {
                self.is_moving = false;
                self.body.velocity = Vector2D::ZERO;
            }
        }
    }

    /// Movement, integration and power-up countdown; returns expired power-ups
    pub fn update(&mut self, dt: f64) -> Vec<PowerUpKind> {
        self.update_movement();
        self.body.integrate(dt);
        self.power_ups.tick(dt)
    }

    pub fn can_fire_bullet(&self, now_ms: f64) -> bool {
        self.active_bullet.is_none()
            && self
                .last_fire_time
                .map_or(true, |last| now_ms - last > self.fire_rate_ms())
    }

    /// Produce a bullet description from the muzzle, or `None` while the slot
    /// is taken or the cooldown runs.
    pub fn fire(&mut self, now_ms: f64) -> Option<BulletSpawn> {
        if !self.can_fire_bullet(now_ms) {
            return None;
        }
        self.last_fire_time = Some(now_ms);

        let direction = self.facing.unit();
        let stats = BulletStats::for_kind(self.bullet);
        Some(BulletSpawn {
            position: self.center() + direction * self.barrel_length,
            direction,
            kind: self.bullet,
            piercing: stats.piercing || self.power_ups.is_active(PowerUpKind::Piercing),
        })
    }

    /// Shield absorbs exactly one hit; returns true if the hit was lethal
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if self.power_ups.consume(PowerUpKind::Shield) {
            return false;
        }
        self.body.take_damage(amount)
    }

    pub fn activate_power_up(&mut self, kind: PowerUpKind, duration_ms: f64) {
        self.power_ups.activate(kind, duration_ms);
    }

    pub fn rotation(&self) -> f64 {
        self.facing.rotation()
    }
}
