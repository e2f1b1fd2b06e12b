//! Pairwise collision detection and handler dispatch over the world

use tracing::debug;

use super::bullet::BulletOwner;
use super::combat::{CombatSystem, Side};
use super::entity::{CollisionLayer, Entity, EntityRef, LayerMask};
use super::physics::PhysicsSystem;
use super::world::{GameEvent, World};

/// Frozen view of one collider at the start of a pass
#[derive(Debug, Clone, Copy)]
struct Collider {
    entity: EntityRef,
    layer: CollisionLayer,
    mask: LayerMask,
    body: BoxBounds,
}

#[derive(Debug, Clone, Copy)]
struct BoxBounds {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

impl BoxBounds {
    fn of(body: &Entity) -> Self {
        Self {
            x: body.position.x,
            y: body.position.y,
            w: body.size.x,
            h: body.size.y,
        }
    }

    fn overlaps(&self, other: &BoxBounds) -> bool {
        self.x < other.x + other.w
            && self.x + self.w > other.x
            && self.y < other.y + other.h
            && self.y + self.h > other.y
    }
}

/// A reacting entity and what it touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub entity: EntityRef,
    pub other: EntityRef,
}

pub struct CollisionSystem;

impl CollisionSystem {
    /// Every contact due this pass, in stable order.
    ///
    /// Colliders are gathered players, enemies, bullets, walls, props,
    /// pickups, each in slot order. A pair yields one contact per side whose
    /// mask contains the other's layer.
    pub fn contacts(world: &World) -> Vec<Contact> {
        let colliders = Self::gather(world);
        let mut contacts = Vec::new();

        for (i, a) in colliders.iter().enumerate() {
            for b in &colliders[i + 1..] {
                let a_reacts = a.mask.contains(b.layer);
                let b_reacts = b.mask.contains(a.layer);
                if !(a_reacts || b_reacts) || !a.body.overlaps(&b.body) {
                    continue;
                }
                if a_reacts {
                    contacts.push(Contact {
                        entity: a.entity,
                        other: b.entity,
                    });
                }
                if b_reacts {
                    contacts.push(Contact {
                        entity: b.entity,
                        other: a.entity,
                    });
                }
            }
        }
        contacts
    }

    fn gather(world: &World) -> Vec<Collider> {
        let mut colliders = Vec::new();
        let mut push = |entity: EntityRef, body: &Entity| {
            if body.collidable() {
                colliders.push(Collider {
                    entity,
                    layer: body.layer,
                    mask: body.mask,
                    body: BoxBounds::of(body),
                });
            }
        };

        for (h, p) in world.players.iter() {
            push(EntityRef::Player(h), &p.tank.body);
        }
        for (h, e) in world.enemies.iter() {
            push(EntityRef::Enemy(h), &e.tank.body);
        }
        for (h, b) in world.bullets.iter() {
            push(EntityRef::Bullet(h), &b.body);
        }
        for (h, w) in world.walls.iter() {
            push(EntityRef::Wall(h), w);
        }
        for (h, d) in world.destructibles.iter() {
            push(EntityRef::Destructible(h), &d.body);
        }
        for (h, p) in world.power_ups.iter() {
            push(EntityRef::PowerUp(h), &p.body);
        }
        colliders
    }

    /// Run one resolution pass. Nothing is removed here; dead entities stay
    /// in their arenas until cleanup but stop reacting immediately.
    pub fn resolve(world: &mut World) {
        let contacts = Self::contacts(world);
        for contact in contacts {
            if !world.is_collidable(contact.entity) || !world.is_collidable(contact.other) {
                continue;
            }
            Self::dispatch(world, contact);
        }
    }

    fn dispatch(world: &mut World, contact: Contact) {
        match contact.entity {
            EntityRef::Bullet(_) => Self::bullet_hit(world, contact),
            EntityRef::Player(_) => Self::player_touch(world, contact),
            EntityRef::Enemy(_) => Self::enemy_touch(world, contact),
            EntityRef::Wall(_) | EntityRef::Destructible(_) | EntityRef::PowerUp(_) => {}
        }
    }

    fn bullet_hit(world: &mut World, contact: Contact) {
        let EntityRef::Bullet(handle) = contact.entity else {
            return;
        };
        let Some(bullet) = world.bullets.get(handle) else {
            return;
        };
        let owner = bullet.owner;
        let side = bullet.side();
        let center = bullet.center();
        let damage = bullet.damage;
        let piercing = bullet.piercing;
        let explosive = bullet.explosive.then_some(bullet.explosion_radius);
        let can_bounce = bullet.can_bounce();

        match contact.other {
            EntityRef::Wall(wall) => {
                if can_bounce {
                    let wall_center = world.walls.get(wall).map(|w| w.center());
                    if let (Some(b), Some(wall_center)) = (world.bullets.get_mut(handle), wall_center) {
                        b.bounce(wall_center);
                    }
                    return;
                }
                Self::detonate(world, center, explosive, damage, owner, side);
                world.retire_bullet(handle);
            }
            EntityRef::Destructible(_) => {
                world.damage(contact.other, damage, owner);
                Self::detonate(world, center, explosive, damage, owner, side);
                if !piercing {
                    world.retire_bullet(handle);
                }
            }
            EntityRef::Player(_) | EntityRef::Enemy(_) => {
                let target_side = match contact.other {
                    EntityRef::Player(_) => Side::Player,
                    _ => Side::Enemy,
                };
                if Self::is_owner(owner, contact.other)
                    || CombatSystem::is_friendly_fire(side, target_side)
                {
                    return;
                }
                let killed = world.damage(contact.other, damage, owner);
                if killed {
                    debug!(target = ?contact.other, ?side, "Tank destroyed by bullet");
                }
                Self::detonate(world, center, explosive, damage, owner, side);
                if !piercing {
                    world.retire_bullet(handle);
                }
            }
            EntityRef::Bullet(_) | EntityRef::PowerUp(_) => {}
        }
    }

    fn is_owner(owner: Option<BulletOwner>, target: EntityRef) -> bool {
        matches!(
            (owner, target),
            (Some(BulletOwner::Player(a)), EntityRef::Player(b)) if a == b
        ) || matches!(
            (owner, target),
            (Some(BulletOwner::Enemy(a)), EntityRef::Enemy(b)) if a == b
        )
    }

    /// Blast for explosive bullets, a plain impact otherwise
    fn detonate(
        world: &mut World,
        center: super::vector::Vector2D,
        explosive: Option<f64>,
        damage: i32,
        owner: Option<BulletOwner>,
        side: Side,
    ) {
        match explosive {
            Some(radius) if radius > 0.0 => world.explode(center, radius, damage, owner, side),
            _ => world.events.push(GameEvent::Impact { position: center }),
        }
    }

    fn player_touch(world: &mut World, contact: Contact) {
        let EntityRef::Player(handle) = contact.entity else {
            return;
        };
        match contact.other {
            EntityRef::Wall(_) | EntityRef::Destructible(_) => {
                Self::push(world, contact, false);
            }
            EntityRef::Enemy(_) => Self::push(world, contact, true),
            EntityRef::PowerUp(item) => {
                let Some(kind) = world.power_ups.get(item).map(|p| p.kind) else {
                    return;
                };
                let Some(player) = world.players.get_mut(handle) else {
                    return;
                };
                player.collect_power_up(kind);
                let index = player.index;
                if let Some(p) = world.power_ups.get_mut(item) {
                    p.body.destroy();
                }
                world.events.push(GameEvent::PowerUpCollected {
                    player: index,
                    kind,
                });
            }
            EntityRef::Player(_) | EntityRef::Bullet(_) => {}
        }
    }

    fn enemy_touch(world: &mut World, contact: Contact) {
        match contact.other {
            EntityRef::Wall(_) | EntityRef::Destructible(_) => Self::push(world, contact, false),
            EntityRef::Player(_) | EntityRef::Enemy(_) => Self::push(world, contact, true),
            EntityRef::Bullet(_) | EntityRef::PowerUp(_) => {}
        }
    }

    /// Static obstacles push fully; tank pairs split the push
    fn push(world: &mut World, contact: Contact, halfway: bool) {
        let Some(obstacle) = world.body(contact.other).cloned() else {
            return;
        };
        let Some(mover) = world.body_mut(contact.entity) else {
            return;
        };
        if halfway {
            PhysicsSystem::separate_halfway(mover, &obstacle);
        } else {
            PhysicsSystem::separate(mover, &obstacle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::arena::Handle;
    use crate::game::bullet::BulletKind;
    use crate::game::director::SpawnOrder;
    use crate::game::enemy::EnemyType;
    use crate::game::tank::{BulletSpawn, Direction, PowerUpKind};
    use crate::game::vector::Vector2D;
    use crate::game::world::PowerUpItem;

    fn world_with_player() -> (World, Handle) {
        let mut world = World::new(3, true);
        world.spawn_players(1);
        let player = world.players.handles().next().expect("player");
        (world, player)
    }

    fn enemy_at(world: &mut World, kind: EnemyType, x: f64, y: f64) -> Handle {
        world.spawn_enemy(SpawnOrder {
            enemy_type: kind,
            position: Vector2D::new(x, y),
        })
    }

    fn shoot(world: &mut World, owner: BulletOwner, at: Vector2D, kind: BulletKind) -> Handle {
        world.create_bullet(
            BulletSpawn {
                position: at,
                direction: Direction::Up.unit(),
                kind,
                piercing: false,
            },
            owner,
        )
    }

    #[test]
    fn player_bullet_kills_enemy_and_frees_the_slot() {
        let (mut w, p) = world_with_player();
        let e = enemy_at(&mut w, EnemyType::Basic, 300.0, 200.0);
        let b = shoot(&mut w, BulletOwner::Player(p), Vector2D::new(316.0, 216.0), BulletKind::Standard);

        CollisionSystem::resolve(&mut w);

        assert!(!w.enemies.get(e).is_some_and(|en| en.alive()));
        assert!(!w.bullets.get(b).is_some_and(|bl| bl.alive()));
        let player = w.players.get(p).expect("player");
        assert_eq!(player.score, 100);
        assert!(player.tank.active_bullet.is_none());
    }

    #[test]
    fn dead_entities_generate_no_contacts() {
        let (mut w, p) = world_with_player();
        let e = enemy_at(&mut w, EnemyType::Basic, 300.0, 200.0);
        if let Some(enemy) = w.enemies.get_mut(e) {
            enemy.tank.body.destroy();
        }
        let b = shoot(&mut w, BulletOwner::Player(p), Vector2D::new(316.0, 216.0), BulletKind::Standard);

        assert!(CollisionSystem::contacts(&w)
            .iter()
            .all(|c| c.entity != EntityRef::Enemy(e) && c.other != EntityRef::Enemy(e)));
        CollisionSystem::resolve(&mut w);
        assert!(w.bullets.get(b).is_some_and(|bl| bl.alive()));
    }

    #[test]
    fn player_bullets_never_hurt_players() {
        let mut w = World::new(3, true);
        w.spawn_players(2);
        let handles: Vec<Handle> = w.players.handles().collect();
        let second_center = w.players.get(handles[1]).map(|p| p.tank.center()).expect("p2");
        let b = shoot(&mut w, BulletOwner::Player(handles[0]), second_center, BulletKind::Standard);

        CollisionSystem::resolve(&mut w);
        assert!(w.players.get(handles[1]).is_some_and(|p| p.lives == 4 && !p.respawning));
        assert!(w.bullets.get(b).is_some_and(|bl| bl.alive()));
    }

    #[test]
    fn enemy_bullet_sends_player_into_respawn() {
        let (mut w, p) = world_with_player();
        let e = enemy_at(&mut w, EnemyType::Basic, 50.0, 50.0);
        let center = w.players.get(p).map(|pl| pl.tank.center()).expect("player");
        shoot(&mut w, BulletOwner::Enemy(e), center, BulletKind::Standard);

        CollisionSystem::resolve(&mut w);
        let player = w.players.get(p).expect("player");
        assert!(player.respawning);
        assert_eq!(player.lives, 3);
        assert!(w.enemies.get(e).is_some_and(|en| en.tank.active_bullet.is_none()));
    }

    #[test]
    fn piercing_bullet_survives_the_hit() {
        let (mut w, p) = world_with_player();
        let e = enemy_at(&mut w, EnemyType::Heavy, 300.0, 200.0);
        let b = shoot(&mut w, BulletOwner::Player(p), Vector2D::new(316.0, 216.0), BulletKind::Piercing);

        CollisionSystem::resolve(&mut w);
        assert_eq!(w.enemies.get(e).map(|en| en.tank.body.health), Some(2));
        assert!(w.bullets.get(b).is_some_and(|bl| bl.alive()));
    }

    #[test]
    fn bouncing_bullet_reflects_off_walls_then_dies() {
        let (mut w, p) = world_with_player();
        let wall = w
            .walls
            .insert(Entity::new(100.0, 100.0, 8.0, 300.0).with_layer(CollisionLayer::Wall, LayerMask::NONE));
        let b = shoot(&mut w, BulletOwner::Player(p), Vector2D::new(106.0, 250.0), BulletKind::Bouncing);
        if let Some(bullet) = w.bullets.get_mut(b) {
            bullet.body.velocity = Vector2D::new(-160.0, 0.0);
        }

        CollisionSystem::resolve(&mut w);
        let bullet = w.bullets.get(b).expect("bullet");
        assert!(bullet.alive());
        assert_eq!(bullet.bounces, 1);
        assert!(bullet.body.velocity.x > 0.0);

        if let Some(bullet) = w.bullets.get_mut(b) {
            bullet.bounces = bullet.max_bounces;
        }
        CollisionSystem::resolve(&mut w);
        assert!(!w.bullets.get(b).is_some_and(|bl| bl.alive()));
        assert!(w.walls.get(wall).is_some_and(|wl| wl.alive));
    }

    #[test]
    fn tanks_are_pushed_out_of_walls() {
        let (mut w, p) = world_with_player();
        w.walls
            .insert(Entity::new(96.0, 102.0, 8.0, 398.0).with_layer(CollisionLayer::Wall, LayerMask::NONE));
        if let Some(player) = w.players.get_mut(p) {
            player.tank.body.set_position(100.0, 200.0);
        }
        CollisionSystem::resolve(&mut w);
        assert_eq!(
            w.players.get(p).map(|pl| pl.tank.body.position),
            Some(Vector2D::new(104.0, 200.0))
        );
    }

    #[test]
    fn overlapping_tanks_each_give_way() {
        let (mut w, p) = world_with_player();
        let spawn = w.players.get(p).map(|pl| pl.tank.body.position).expect("player");
        let e = enemy_at(&mut w, EnemyType::Basic, spawn.x + 28.0, spawn.y);

        CollisionSystem::resolve(&mut w);
        let px = w.players.get(p).map(|pl| pl.tank.body.position.x).expect("player");
        let ex = w.enemies.get(e).map(|en| en.tank.body.position.x).expect("enemy");
        assert!(px < spawn.x);
        assert!(ex > spawn.x + 28.0);
    }

    #[test]
    fn players_collect_power_ups() {
        let (mut w, p) = world_with_player();
        let center = w.players.get(p).map(|pl| pl.tank.center()).expect("player");
        let item = w.power_ups.insert(PowerUpItem::new(center, PowerUpKind::Speed));

        CollisionSystem::resolve(&mut w);
        let player = w.players.get(p).expect("player");
        assert!(player.tank.power_ups.is_active(PowerUpKind::Speed));
        assert_eq!(player.score, 100);
        assert!(w.power_ups.get(item).is_some_and(|i| !i.body.alive));
        assert!(w
            .drain_events()
            .contains(&GameEvent::PowerUpCollected { player: 0, kind: PowerUpKind::Speed }));
    }
}
