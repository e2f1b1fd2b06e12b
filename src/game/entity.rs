//! Base simulated object shared by every entity collection

use serde::{Deserialize, Serialize};

use super::arena::Handle;
use super::vector::Vector2D;

/// Velocity retained after one second of friction
const FRICTION_PER_SECOND: f64 = 0.02;

/// Collision layer tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionLayer {
    Tank,
    Player,
    Enemy,
    Wall,
    PlayerBullet,
    EnemyBullet,
    Destructible,
    Decoration,
    PowerUp,
}

impl CollisionLayer {
    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Set of layers an entity reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerMask(u16);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);

    pub fn of(layers: &[CollisionLayer]) -> Self {
        Self(layers.iter().fold(0, |acc, layer| acc | layer.bit()))
    }

    pub fn contains(self, layer: CollisionLayer) -> bool {
        self.0 & layer.bit() != 0
    }
}

/// Which collection owns an entity, plus its handle there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityRef {
    Player(Handle),
    Enemy(Handle),
    Bullet(Handle),
    Wall(Handle),
    Destructible(Handle),
    PowerUp(Handle),
}

/// Axis-aligned body with health and collision tags
#[derive(Debug, Clone)]
pub struct Entity {
    /// Top-left corner
    pub position: Vector2D,
    /// Width and height
    pub size: Vector2D,
    pub velocity: Vector2D,
    pub apply_friction: bool,
    pub health: i32,
    pub max_health: i32,
    pub alive: bool,
    pub visible: bool,
    pub solid: bool,
    pub layer: CollisionLayer,
    pub mask: LayerMask,
}

impl Entity {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            position: Vector2D::new(x, y),
            size: Vector2D::new(width, height),
            velocity: Vector2D::ZERO,
            apply_friction: true,
            health: 1,
            max_health: 1,
            alive: true,
            visible: true,
            solid: true,
            layer: CollisionLayer::Decoration,
            mask: LayerMask::NONE,
        }
    }

    pub fn with_layer(mut self, layer: CollisionLayer, mask: LayerMask) -> Self {
        self.layer = layer;
        self.mask = mask;
        self
    }

    pub fn with_health(mut self, health: i32) -> Self {
        self.health = health;
        self.max_health = health;
        self
    }

    pub fn center(&self) -> Vector2D {
        Vector2D::new(
            self.position.x + self.size.x / 2.0,
            self.position.y + self.size.y / 2.0,
        )
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.position = Vector2D::new(x, y);
    }

    /// Bounding box overlap, touching edges do not count
    pub fn intersects(&self, other: &Entity) -> bool {
        self.position.x < other.position.x + other.size.x
            && self.position.x + self.size.x > other.position.x
            && self.position.y < other.position.y + other.size.y
            && self.position.y + self.size.y > other.position.y
    }

    /// Whether this entity takes part in collision pairs at all
    pub fn collidable(&self) -> bool {
        self.alive && self.solid
    }

    /// Integrate velocity over `dt` seconds, then apply friction
    pub fn integrate(&mut self, dt: f64) {
        self.position = self.position + self.velocity * dt;
        if self.apply_friction {
            self.velocity = self.velocity * FRICTION_PER_SECOND.powf(dt);
        }
    }

    /// Subtract health; returns true if this call killed the entity
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if !self.alive || amount <= 0 {
            return false;
        }
        self.health -= amount;
        if self.health <= 0 {
            self.health = 0;
            self.destroy();
            return true;
        }
        false
    }

    /// Mark dead; removal happens on the next cleanup pass
    pub fn destroy(&mut self) {
        self.alive = false;
    }

    /// Keep the box inside `[0, width] x [0, height]`
    pub fn clamp_to(&mut self, width: f64, height: f64) {
        self.position.x = self.position.x.clamp(0.0, (width - self.size.x).max(0.0));
        self.position.y = self.position.y.clamp(0.0, (height - self.size.y).max(0.0));
    }

    pub fn is_outside(&self, width: f64, height: f64) -> bool {
        self.position.x + self.size.x < 0.0
            || self.position.y + self.size.y < 0.0
            || self.position.x > width
            || self.position.y > height
    }
}
