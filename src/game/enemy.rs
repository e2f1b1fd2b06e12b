//! AI-controlled opponent tanks

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::arena::Handle;
use super::bullet::BulletKind;
use super::combat::{BulletStats, TankStats};
use super::entity::{CollisionLayer, LayerMask};
use super::tank::{BulletSpawn, Direction, PowerUpKind, Tank};
use super::vector::Vector2D;

/// Chance per decision to chase the target rather than wander
const CHASE_CHANCE: f64 = 0.7;
/// Chance per AI tick to take a blind shot
const BLIND_FIRE_CHANCE: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyType {
    Basic,
    Fast,
    Heavy,
    Boss,
    Flame,
    Flamethrower,
}

impl EnemyType {
    /// Boss-class kinds always drop a power-up and end boss phases
    pub fn is_boss(self) -> bool {
        matches!(self, EnemyType::Boss | EnemyType::Flamethrower)
    }

    pub fn sprite(self) -> &'static str {
        match self {
            EnemyType::Boss => "enemy2",
            EnemyType::Flame => "enemy3",
            EnemyType::Flamethrower => "enemy4",
            EnemyType::Basic | EnemyType::Fast | EnemyType::Heavy => "enemy1",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Enemy {
    pub tank: Tank,
    pub enemy_type: EnemyType,
    /// Host-assigned id shared with peers
    pub net_id: Uuid,
    /// Nearest live player, generation-checked
    pub target: Option<Handle>,
    pub points: u32,
    decision_timer_ms: f64,
    wants_fire: bool,
}

impl Enemy {
    pub fn new(x: f64, y: f64, enemy_type: EnemyType, net_id: Uuid) -> Self {
        let stats = TankStats::for_enemy(enemy_type);
        let mask = LayerMask::of(&[
            CollisionLayer::Wall,
            CollisionLayer::Player,
            CollisionLayer::Enemy,
            CollisionLayer::PlayerBullet,
            CollisionLayer::Destructible,
        ]);
        Self {
            tank: Tank::new(x, y, &stats, CollisionLayer::Enemy, mask),
            enemy_type,
            net_id,
            target: None,
            points: stats.points,
            decision_timer_ms: 0.0,
            wants_fire: false,
        }
    }

    pub fn alive(&self) -> bool {
        self.tank.body.alive
    }

    pub fn center(&self) -> Vector2D {
        self.tank.center()
    }

    pub fn set_target(&mut self, target: Option<Handle>) {
        self.target = target;
    }

    /// One AI step. `target_center` is the resolved position of `target`.
    pub fn update<R: Rng>(
        &mut self,
        dt: f64,
        target_center: Option<Vector2D>,
        rng: &mut R,
    ) -> Vec<PowerUpKind> {
        let center = self.center();

        self.decision_timer_ms -= dt * 1000.0;
        if self.decision_timer_ms <= 0.0 {
            self.decision_timer_ms = rng.gen_range(600.0..1500.0);
            let direction = match target_center {
                Some(target) if rng.gen::<f64>() < CHASE_CHANCE => {
                    Direction::from_vector(target - center).unwrap_or_default()
                }
                _ => Direction::from_index(rng.gen_range(0..4)),
            };
            self.tank.set_move_direction(direction.unit());
        }

        self.wants_fire = rng.gen::<f64>() < BLIND_FIRE_CHANCE;
        if let Some(target) = target_center {
            let delta = target - center;
            let half = self.tank.body.size.x / 2.0;
            let line_of_fire = if delta.x.abs() < half {
                Some(if delta.y < 0.0 { Direction::Up } else { Direction::Down })
            } else if delta.y.abs() < half {
                Some(if delta.x < 0.0 { Direction::Left } else { Direction::Right })
            } else {
                None
            };

            if let Some(direction) = line_of_fire {
                self.tank.set_move_direction(direction.unit());
                let range = BulletStats::for_kind(self.tank.bullet).max_distance;
                self.wants_fire = delta.magnitude() <= range;
            }
        }

        self.tank.update(dt)
    }

    pub fn attempt_fire(&mut self, now_ms: f64) -> Option<BulletSpawn> {
        if !self.alive() || !self.wants_fire {
            return None;
        }
        self.tank.fire(now_ms)
    }

    /// Returns true if the hit destroyed this enemy
    pub fn take_damage(&mut self, amount: i32) -> bool {
        self.tank.take_damage(amount)
    }

    pub fn fires(&self) -> BulletKind {
        self.tank.bullet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn aligned_target_draws_fire() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut enemy = Enemy::new(100.0, 100.0, EnemyType::Basic, Uuid::new_v4());
        // Player straight below, within range
        let target = Vector2D::new(116.0, 400.0);
        enemy.update(0.05, Some(target), &mut rng);
        assert_eq!(enemy.tank.facing, Direction::Down);
        assert!(enemy.attempt_fire(10_000.0).is_some());
        // Slot is free but cooldown is running
        assert!(enemy.attempt_fire(10_100.0).is_none());
    }

    #[test]
    fn dead_enemy_never_fires() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut enemy = Enemy::new(100.0, 100.0, EnemyType::Heavy, Uuid::new_v4());
        assert!(!enemy.take_damage(2));
        assert!(enemy.take_damage(1));
        enemy.update(0.05, Some(Vector2D::new(116.0, 300.0)), &mut rng);
        assert!(enemy.attempt_fire(10_000.0).is_none());
    }

    #[test]
    fn boss_kinds() {
        assert!(EnemyType::Boss.is_boss());
        assert!(EnemyType::Flamethrower.is_boss());
        assert!(!EnemyType::Flame.is_boss());
        let boss = Enemy::new(0.0, 0.0, EnemyType::Boss, Uuid::new_v4());
        assert_eq!(boss.tank.body.size, Vector2D::new(48.0, 48.0));
        assert_eq!(boss.fires(), BulletKind::Missile);
    }
}
