//! Projectiles: travel cap, bouncing, piercing, explosive payloads

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::arena::Handle;
use super::combat::{BulletStats, Side};
use super::entity::{CollisionLayer, Entity, LayerMask};
use super::vector::Vector2D;

/// Speed kept after each bounce
const BOUNCE_DAMPING: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletKind {
    Standard,
    Rapid,
    Heavy,
    Piercing,
    Bouncing,
    Missile,
    Fireball,
    Flame,
}

/// Firing tank, resolved through its collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletOwner {
    Player(Handle),
    Enemy(Handle),
}

impl BulletOwner {
    pub fn side(self) -> Side {
        match self {
            BulletOwner::Player(_) => Side::Player,
            BulletOwner::Enemy(_) => Side::Enemy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bullet {
    pub body: Entity,
    pub net_id: Uuid,
    pub kind: BulletKind,
    /// Unit vector
    pub direction: Vector2D,
    pub speed: f64,
    pub damage: i32,
    pub owner: Option<BulletOwner>,
    /// Player id of the peer that fired a mirrored bullet
    pub network_origin: Option<String>,
    pub max_distance: f64,
    pub traveled_distance: f64,
    pub piercing: bool,
    pub bounces: i32,
    pub max_bounces: i32,
    pub explosive: bool,
    pub explosion_radius: f64,
}

impl Bullet {
    /// Bullet centered on `center`, travelling along `direction`
    pub fn new(
        center: Vector2D,
        direction: Vector2D,
        kind: BulletKind,
        side: Side,
        net_id: Uuid,
    ) -> Self {
        let stats = BulletStats::for_kind(kind);
        let (layer, mask) = match side {
            Side::Player => (
                CollisionLayer::PlayerBullet,
                LayerMask::of(&[
                    CollisionLayer::Enemy,
                    CollisionLayer::Wall,
                    CollisionLayer::Destructible,
                ]),
            ),
            Side::Enemy => (
                CollisionLayer::EnemyBullet,
                LayerMask::of(&[
                    CollisionLayer::Player,
                    CollisionLayer::Wall,
                    CollisionLayer::Destructible,
                ]),
            ),
        };

        let direction = direction.normalize();
        let mut body = Entity::new(
            center.x - stats.size / 2.0,
            center.y - stats.size / 2.0,
            stats.size,
            stats.size,
        )
        .with_layer(layer, mask);
        body.apply_friction = false;
        body.velocity = direction * stats.speed;

        Self {
            body,
            net_id,
            kind,
            direction,
            speed: stats.speed,
            damage: stats.damage,
            owner: None,
            network_origin: None,
            max_distance: stats.max_distance,
            traveled_distance: 0.0,
            piercing: stats.piercing,
            bounces: 0,
            max_bounces: stats.max_bounces,
            explosive: stats.explosion_radius.is_some(),
            explosion_radius: stats.explosion_radius.unwrap_or(0.0),
        }
    }

    /// Bullet fired by a remote peer's player.
    ///
    /// It has no local owner so it cannot hit the firing peer's shadow, and it
    /// sits on the player-bullet layer so it interacts with local enemies.
    pub fn from_network(
        center: Vector2D,
        direction: Vector2D,
        kind: BulletKind,
        net_id: Uuid,
        player_id: String,
    ) -> Self {
        let mut bullet = Self::new(center, direction, kind, Side::Player, net_id);
        bullet.network_origin = Some(player_id);
        bullet
    }

    pub fn alive(&self) -> bool {
        self.body.alive
    }

    /// Team the bullet fights for; ownerless bullets came from remote players
    pub fn side(&self) -> Side {
        match self.owner {
            Some(owner) => owner.side(),
            None if self.body.layer == CollisionLayer::EnemyBullet => Side::Enemy,
            None => Side::Player,
        }
    }

    pub fn center(&self) -> Vector2D {
        self.body.center()
    }

    /// Move and accumulate travel; returns false once the bullet is spent
    pub fn update(&mut self, dt: f64) -> bool {
        if !self.alive() {
            return false;
        }

        let movement = self.body.velocity * dt;
        self.body.position = self.body.position + movement;
        self.traveled_distance += movement.magnitude();

        if self.traveled_distance >= self.max_distance {
            self.body.destroy();
            return false;
        }
        true
    }

    pub fn can_bounce(&self) -> bool {
        self.bounces < self.max_bounces
    }

    /// Reflect off a wall using the dominant center-to-center axis
    pub fn bounce(&mut self, wall_center: Vector2D) {
        let delta = self.center() - wall_center;
        if delta.x.abs() > delta.y.abs() {
            self.body.velocity.x = -self.body.velocity.x;
            self.direction.x = -self.direction.x;
        } else {
            self.body.velocity.y = -self.body.velocity.y;
            self.direction.y = -self.direction.y;
        }
        self.bounces += 1;
        self.body.velocity = self.body.velocity * BOUNCE_DAMPING;
        self.speed *= BOUNCE_DAMPING;
    }

    pub fn destroy(&mut self) {
        self.body.destroy();
    }

    pub fn rotation(&self) -> f64 {
        self.direction.y.atan2(self.direction.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_cap_expires_standard_bullet_at_three_seconds() {
        let mut bullet = Bullet::new(
            Vector2D::new(400.0, 300.0),
            Vector2D::new(1.0, 0.0),
            BulletKind::Standard,
            Side::Player,
            Uuid::new_v4(),
        );
        assert_eq!(bullet.max_distance, 600.0);
        assert_eq!(bullet.speed, 200.0);

        let dt = 1.0 / 60.0;
        let mut frames = 0;
        while bullet.update(dt) {
            frames += 1;
            assert!(frames < 1000);
        }
        let elapsed = (frames + 1) as f64 * dt;
        assert!((elapsed - 3.0).abs() <= dt + 1e-9, "expired at {elapsed}");
        assert!(!bullet.alive());
    }

    #[test]
    fn bounce_reflects_dominant_axis_and_slows() {
        let mut bullet = Bullet::new(
            Vector2D::new(100.0, 100.0),
            Vector2D::new(1.0, 0.0),
            BulletKind::Bouncing,
            Side::Enemy,
            Uuid::new_v4(),
        );
        assert!(bullet.can_bounce());
        // Wall to the right
        bullet.bounce(Vector2D::new(110.0, 101.0));
        assert!(bullet.body.velocity.x < 0.0);
        assert!((bullet.body.velocity.x + 160.0 * 0.9).abs() < 1e-9);
        assert_eq!(bullet.direction, Vector2D::new(-1.0, 0.0));
        bullet.bounce(Vector2D::new(90.0, 100.5));
        assert!(!bullet.can_bounce());
    }

    #[test]
    fn layers_follow_the_firing_side() {
        let p = Bullet::new(Vector2D::ZERO, Vector2D::new(0.0, -1.0), BulletKind::Standard, Side::Player, Uuid::new_v4());
        assert_eq!(p.body.layer, CollisionLayer::PlayerBullet);
        assert!(p.body.mask.contains(CollisionLayer::Enemy));
        assert!(!p.body.mask.contains(CollisionLayer::Player));

        let e = Bullet::new(Vector2D::ZERO, Vector2D::new(0.0, 1.0), BulletKind::Missile, Side::Enemy, Uuid::new_v4());
        assert_eq!(e.side(), Side::Enemy);
        assert!(e.explosive);
        assert_eq!(e.explosion_radius, 80.0);
    }

    #[test]
    fn network_bullets_are_ownerless_player_bullets() {
        let b = Bullet::from_network(
            Vector2D::new(10.0, 10.0),
            Vector2D::new(0.0, -1.0),
            BulletKind::Standard,
            Uuid::new_v4(),
            "peer-7".to_string(),
        );
        assert!(b.owner.is_none());
        assert_eq!(b.side(), Side::Player);
        assert_eq!(b.body.layer, CollisionLayer::PlayerBullet);
        assert_eq!(b.network_origin.as_deref(), Some("peer-7"));
    }
}
