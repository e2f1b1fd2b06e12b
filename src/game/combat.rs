//! Combat system - tank/weapon stats, damage rules, explosion falloff

use super::bullet::BulletKind;
use super::enemy::EnemyType;

/// Explosions deal up to this multiple of the bullet's damage at point-blank
pub const EXPLOSION_BONUS: f64 = 1.5;

/// Which team fired a bullet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Player,
    Enemy,
}

/// Tank stats per combatant kind
#[derive(Debug, Clone, Copy)]
pub struct TankStats {
    /// Movement speed (px/s)
    pub speed: f64,
    pub max_health: i32,
    /// Minimum time between shots (ms)
    pub fire_rate_ms: f64,
    pub bullet: BulletKind,
    /// Body edge length
    pub size: f64,
    /// Score awarded for destroying this tank
    pub points: u32,
}

impl TankStats {
    pub fn player() -> Self {
        Self {
            speed: 90.0,
            max_health: 1,
            fire_rate_ms: 400.0,
            bullet: BulletKind::Standard,
            size: 32.0,
            points: 0,
        }
    }

    pub fn for_enemy(enemy_type: EnemyType) -> Self {
        match enemy_type {
            EnemyType::Basic => Self {
                speed: 60.0,
                max_health: 1,
                fire_rate_ms: 1500.0,
                bullet: BulletKind::Standard,
                size: 32.0,
                points: 100,
            },
            EnemyType::Fast => Self {
                speed: 110.0,
                max_health: 1,
                fire_rate_ms: 1200.0,
                bullet: BulletKind::Rapid,
                size: 32.0,
                points: 150,
            },
            EnemyType::Heavy => Self {
                speed: 45.0,
                max_health: 3,
                fire_rate_ms: 2000.0,
                bullet: BulletKind::Heavy,
                size: 32.0,
                points: 200,
            },
            EnemyType::Boss => Self {
                speed: 50.0,
                max_health: 10,
                fire_rate_ms: 2500.0,
                bullet: BulletKind::Missile,
                size: 48.0,
                points: 1000,
            },
            EnemyType::Flame => Self {
                speed: 70.0,
                max_health: 2,
                fire_rate_ms: 1400.0,
                bullet: BulletKind::Fireball,
                size: 32.0,
                points: 250,
            },
            EnemyType::Flamethrower => Self {
                speed: 40.0,
                max_health: 15,
                fire_rate_ms: 300.0,
                bullet: BulletKind::Flame,
                size: 48.0,
                points: 2000,
            },
        }
    }
}

/// Projectile stats per bullet kind
#[derive(Debug, Clone, Copy)]
pub struct BulletStats {
    pub speed: f64,
    pub damage: i32,
    pub size: f64,
    pub max_distance: f64,
    pub piercing: bool,
    pub max_bounces: i32,
    /// Blast radius for explosive kinds
    pub explosion_radius: Option<f64>,
}

impl BulletStats {
    pub fn for_kind(kind: BulletKind) -> Self {
        let standard = Self {
            speed: 200.0,
            damage: 1,
            size: 4.0,
            max_distance: 600.0,
            piercing: false,
            max_bounces: 0,
            explosion_radius: None,
        };

        match kind {
            BulletKind::Standard => standard,
            BulletKind::Rapid => Self {
                speed: 250.0,
                size: 3.0,
                ..standard
            },
            BulletKind::Heavy => Self {
                speed: 150.0,
                damage: 2,
                size: 6.0,
                ..standard
            },
            BulletKind::Piercing => Self {
                speed: 180.0,
                piercing: true,
                ..standard
            },
            BulletKind::Bouncing => Self {
                speed: 160.0,
                max_bounces: 2,
                ..standard
            },
            BulletKind::Missile => Self {
                damage: 2,
                size: 16.0,
                explosion_radius: Some(80.0),
                ..standard
            },
            BulletKind::Fireball => Self {
                size: 12.0,
                ..standard
            },
            BulletKind::Flame => Self {
                speed: 160.0,
                size: 10.0,
                max_distance: 120.0,
                piercing: true,
                ..standard
            },
        }
    }
}

/// Stateless combat rules
pub struct CombatSystem;

impl CombatSystem {
    /// Area damage at `distance` from the blast center.
    ///
    /// Linear falloff from `ceil(damage * 1.5)` at the center to zero at the
    /// radius edge; nothing beyond the radius.
    pub fn explosion_damage(distance: f64, radius: f64, damage: i32) -> i32 {
        if radius <= 0.0 || distance > radius {
            return 0;
        }
        let ratio = 1.0 - distance / radius;
        (ratio * damage as f64 * EXPLOSION_BONUS).ceil() as i32
    }

    /// Players never damage each other
    pub fn is_friendly_fire(shooter: Side, target: Side) -> bool {
        shooter == Side::Player && target == Side::Player
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explosion_falloff_edges() {
        assert_eq!(CombatSystem::explosion_damage(0.0, 80.0, 2), 3);
        assert_eq!(CombatSystem::explosion_damage(0.0, 80.0, 1), 2);
        assert_eq!(CombatSystem::explosion_damage(80.0, 80.0, 2), 0);
        assert_eq!(CombatSystem::explosion_damage(81.0, 80.0, 2), 0);
        // Half way: 0.5 * 2 * 1.5 = 1.5 -> 2
        assert_eq!(CombatSystem::explosion_damage(40.0, 80.0, 2), 2);
    }

    #[test]
    fn only_player_on_player_is_friendly() {
        assert!(CombatSystem::is_friendly_fire(Side::Player, Side::Player));
        assert!(!CombatSystem::is_friendly_fire(Side::Player, Side::Enemy));
        assert!(!CombatSystem::is_friendly_fire(Side::Enemy, Side::Player));
        assert!(!CombatSystem::is_friendly_fire(Side::Enemy, Side::Enemy));
    }

    #[test]
    fn bosses_outlast_grunts() {
        let basic = TankStats::for_enemy(EnemyType::Basic);
        let boss = TankStats::for_enemy(EnemyType::Boss);
        assert!(boss.max_health > basic.max_health);
        assert!(boss.points > basic.points);
        assert!(BulletStats::for_kind(BulletKind::Missile).explosion_radius.is_some());
    }
}
