//! Simulation context: entity collections and the services they share
//!
//! Every subsystem receives `&mut World` instead of reaching for globals.
//! Entities are only marked dead during a frame; removal waits for
//! [`World::cleanup`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use super::arena::{Arena, Handle};
use super::bullet::{Bullet, BulletKind, BulletOwner};
use super::combat::{CombatSystem, Side};
use super::director::{Census, SpawnOrder};
use super::enemy::{Enemy, EnemyType};
use super::entity::{CollisionLayer, Entity, EntityRef, LayerMask};
use super::physics::{PhysicsSystem, ARENA_WIDTH};
use super::player::Player;
use super::stage::{Destructible, DestructibleKind, StageLayout};
use super::tank::{BulletSpawn, PowerUpKind};
use super::vector::Vector2D;

/// Drop chance for a destroyed heavy tank; boss kinds always drop
const POWER_UP_DROP_CHANCE: f64 = 0.3;
const POWER_UP_SIZE: f64 = 20.0;
const DROPPABLE: [PowerUpKind; 5] = [
    PowerUpKind::RapidFire,
    PowerUpKind::Piercing,
    PowerUpKind::Shield,
    PowerUpKind::Speed,
    PowerUpKind::ExtraLife,
];

/// Pickup lying in the arena
#[derive(Debug, Clone)]
pub struct PowerUpItem {
    pub body: Entity,
    pub kind: PowerUpKind,
}

impl PowerUpItem {
    pub fn new(center: Vector2D, kind: PowerUpKind) -> Self {
        let half = POWER_UP_SIZE / 2.0;
        let mut body = Entity::new(center.x - half, center.y - half, POWER_UP_SIZE, POWER_UP_SIZE)
            .with_layer(CollisionLayer::PowerUp, LayerMask::NONE);
        body.apply_friction = false;
        Self { body, kind }
    }
}

/// Things that happened this frame, consumed by audio, effects and the
/// network authority
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    BulletFired {
        net_id: Uuid,
        kind: BulletKind,
        side: Side,
        /// Set when a local player fired
        local_player: Option<usize>,
        position: Vector2D,
        direction: Vector2D,
    },
    Explosion {
        position: Vector2D,
        radius: f64,
    },
    Impact {
        position: Vector2D,
    },
    EnemySpawned {
        net_id: Uuid,
        enemy_type: EnemyType,
        position: Vector2D,
    },
    EnemyDestroyed {
        net_id: Uuid,
        enemy_type: EnemyType,
        position: Vector2D,
    },
    DestructibleDestroyed {
        id: u32,
        kind: DestructibleKind,
        position: Vector2D,
    },
    PowerUpCollected {
        player: usize,
        kind: PowerUpKind,
    },
    PlayerDied {
        player: usize,
        lives: i32,
    },
}

/// Result of one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub enemies_killed: u32,
    pub bullets_removed: usize,
    pub players_removed: usize,
}

pub struct World {
    pub players: Arena<Player>,
    pub enemies: Arena<Enemy>,
    pub bullets: Arena<Bullet>,
    pub walls: Arena<Entity>,
    pub destructibles: Arena<Destructible>,
    pub power_ups: Arena<PowerUpItem>,
    pub rng: ChaCha8Rng,
    /// Simulation time (ms), the basis of fire cooldowns
    pub sim_time_ms: f64,
    /// Offline or host: decides kills, drops and spawns
    pub authoritative: bool,
    /// Score of players already removed from the roster
    pub retired_score: u32,
    pub events: Vec<GameEvent>,
}

impl World {
    pub fn new(seed: u64, authoritative: bool) -> Self {
        Self {
            players: Arena::new(),
            enemies: Arena::new(),
            bullets: Arena::new(),
            walls: Arena::new(),
            destructibles: Arena::new(),
            power_ups: Arena::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            sim_time_ms: 0.0,
            authoritative,
            retired_score: 0,
            events: Vec::new(),
        }
    }

    pub fn advance_clock(&mut self, dt: f64) {
        self.sim_time_ms += dt * 1000.0;
    }

    /// Seeded v4 id so replays with the same seed agree
    pub fn next_id(&mut self) -> Uuid {
        uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid()
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replace the roster with `count` players at their spawn slots
    pub fn spawn_players(&mut self, count: usize) {
        self.players.clear();
        self.retired_score = 0;
        for index in 0..count {
            self.players.insert(Player::at_spawn_slot(index));
        }
    }

    /// Remove every enemy, bullet and pickup, releasing fire slots
    pub fn clear_combatants(&mut self) {
        self.enemies.clear();
        self.bullets.clear();
        self.power_ups.clear();
        for player in self.players.values_mut() {
            player.tank.active_bullet = None;
        }
    }

    /// Swap the static scenery for `layout`
    pub fn load_layout(&mut self, layout: StageLayout) {
        self.walls.clear();
        self.destructibles.clear();
        for wall in layout.walls() {
            self.walls.insert(wall);
        }
        for prop in layout.destructibles() {
            self.destructibles.insert(prop);
        }
        info!(
            ?layout,
            walls = self.walls.len(),
            destructibles = self.destructibles.len(),
            "Stage layout loaded"
        );
    }

    /// Living enemies by kind
    pub fn census(&self) -> Census {
        Census::from_types(
            self.enemies
                .values()
                .filter(|e| e.alive())
                .map(|e| e.enemy_type),
        )
    }

    /// Nearest live, non-respawning player to `from`
    fn nearest_in(players: &Arena<Player>, from: Vector2D) -> Option<Handle> {
        players
            .iter()
            .filter(|(_, p)| p.alive() && !p.respawning)
            .map(|(h, p)| (h, from.distance_to(p.tank.center())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h)
    }

    pub fn nearest_player(&self, from: Vector2D) -> Option<Handle> {
        Self::nearest_in(&self.players, from)
    }

    /// Create an enemy from a director order (authoritative side)
    pub fn spawn_enemy(&mut self, order: SpawnOrder) -> Handle {
        let net_id = self.next_id();
        self.events.push(GameEvent::EnemySpawned {
            net_id,
            enemy_type: order.enemy_type,
            position: order.position,
        });
        self.insert_enemy(net_id, order.enemy_type, order.position)
    }

    /// Create an enemy announced by the host
    pub fn spawn_mirrored_enemy(
        &mut self,
        net_id: Uuid,
        enemy_type: EnemyType,
        position: Vector2D,
    ) -> Handle {
        self.insert_enemy(net_id, enemy_type, position)
    }

    fn insert_enemy(&mut self, net_id: Uuid, enemy_type: EnemyType, position: Vector2D) -> Handle {
        let mut enemy = Enemy::new(position.x, position.y, enemy_type, net_id);
        enemy.set_target(self.nearest_player(enemy.center()));
        self.enemies.insert(enemy)
    }

    /// Debug spawn near the top edge, bypassing the director
    pub fn debug_spawn(&mut self, enemy_type: EnemyType) -> Handle {
        let x = self.rng.gen::<f64>() * (ARENA_WIDTH - 64.0) + 32.0;
        let order = SpawnOrder {
            enemy_type,
            position: Vector2D::new(x, 50.0),
        };
        info!(?enemy_type, x, "Debug spawned enemy");
        self.spawn_enemy(order)
    }

    pub fn find_enemy(&self, net_id: Uuid) -> Option<Handle> {
        self.enemies
            .iter()
            .find(|(_, e)| e.net_id == net_id)
            .map(|(h, _)| h)
    }

    pub fn find_destructible(&self, id: u32) -> Option<Handle> {
        self.destructibles
            .iter()
            .find(|(_, d)| d.id == id)
            .map(|(h, _)| h)
    }

    /// Player timers and movement, clamped to the arena
    pub fn update_players(&mut self, dt: f64) {
        for player in self.players.values_mut() {
            if !player.alive() {
                continue;
            }
            for expired in player.update(dt) {
                debug!(player = player.index, ?expired, "Power-up expired");
            }
            PhysicsSystem::clamp_to_arena(&mut player.tank.body);
        }
    }

    /// Move bullets; spent or off-arena bullets free their owner's slot
    pub fn update_bullets(&mut self, dt: f64) {
        let mut spent = Vec::new();
        for (handle, bullet) in self.bullets.iter_mut() {
            if !bullet.alive() {
                continue;
            }
            let flying = bullet.update(dt);
            if !flying || PhysicsSystem::is_off_arena(&bullet.body) {
                bullet.destroy();
                spent.push(handle);
            }
        }
        for handle in spent {
            self.release_owner_slot(handle);
        }
    }

    /// Retarget and run AI for every live enemy. `dt` is compensated.
    pub fn update_enemies(&mut self, dt: f64) {
        let players = &self.players;
        let rng = &mut self.rng;
        for enemy in self.enemies.values_mut() {
            if !enemy.alive() {
                continue;
            }
            let target = Self::nearest_in(players, enemy.center());
            enemy.set_target(target);
            let target_center = target
                .and_then(|h| players.get(h))
                .map(|p| p.tank.center());
            enemy.update(dt, target_center, rng);
            PhysicsSystem::clamp_to_arena(&mut enemy.tank.body);
        }
    }

    /// Walls and props; static today but integrated like any body
    pub fn update_statics(&mut self, dt: f64) {
        for wall in self.walls.values_mut().filter(|w| w.alive) {
            wall.integrate(dt);
        }
        for prop in self.destructibles.values_mut().filter(|d| d.body.alive) {
            prop.body.integrate(dt);
        }
    }

    /// Fire for every tank whose trigger and cooldown allow it
    pub fn handle_firing(&mut self) {
        let now = self.sim_time_ms;

        let mut shots: Vec<(BulletOwner, BulletSpawn)> = Vec::new();
        for (handle, player) in self.players.iter_mut() {
            if let Some(spawn) = player.attempt_fire(now) {
                shots.push((BulletOwner::Player(handle), spawn));
            }
        }
        for (handle, enemy) in self.enemies.iter_mut() {
            if let Some(spawn) = enemy.attempt_fire(now) {
                shots.push((BulletOwner::Enemy(handle), spawn));
            }
        }

        for (owner, spawn) in shots {
            self.create_bullet(spawn, owner);
        }
    }

    /// Materialize a shot and occupy the owner's bullet slot
    pub fn create_bullet(&mut self, spawn: BulletSpawn, owner: BulletOwner) -> Handle {
        let net_id = self.next_id();
        let mut bullet = Bullet::new(
            spawn.position,
            spawn.direction,
            spawn.kind,
            owner.side(),
            net_id,
        );
        bullet.piercing |= spawn.piercing;
        bullet.owner = Some(owner);
        let handle = self.bullets.insert(bullet);

        let local_player = match owner {
            BulletOwner::Player(h) => self.players.get_mut(h).map(|p| {
                p.tank.active_bullet = Some(handle);
                p.index
            }),
            BulletOwner::Enemy(h) => {
                if let Some(e) = self.enemies.get_mut(h) {
                    e.tank.active_bullet = Some(handle);
                }
                None
            }
        };

        self.events.push(GameEvent::BulletFired {
            net_id,
            kind: spawn.kind,
            side: owner.side(),
            local_player,
            position: spawn.position,
            direction: spawn.direction,
        });
        handle
    }

    /// Bullet fired by a remote player; owns no local slot
    pub fn spawn_network_bullet(
        &mut self,
        net_id: Uuid,
        kind: BulletKind,
        position: Vector2D,
        direction: Vector2D,
        player_id: String,
    ) -> Handle {
        let bullet = Bullet::from_network(position, direction, kind, net_id, player_id);
        self.events.push(GameEvent::BulletFired {
            net_id,
            kind,
            side: Side::Player,
            local_player: None,
            position,
            direction,
        });
        self.bullets.insert(bullet)
    }

    /// Clear the owner's slot if it still points at `bullet`
    pub fn release_owner_slot(&mut self, bullet: Handle) {
        let Some(owner) = self.bullets.get(bullet).and_then(|b| b.owner) else {
            return;
        };
        let tank = match owner {
            BulletOwner::Player(h) => self.players.get_mut(h).map(|p| &mut p.tank),
            BulletOwner::Enemy(h) => self.enemies.get_mut(h).map(|e| &mut e.tank),
        };
        if let Some(tank) = tank {
            if tank.active_bullet == Some(bullet) {
                tank.active_bullet = None;
            }
        }
    }

    /// Destroy a bullet and free its owner's slot
    pub fn retire_bullet(&mut self, bullet: Handle) {
        if let Some(b) = self.bullets.get_mut(bullet) {
            b.destroy();
        }
        self.release_owner_slot(bullet);
    }

    pub fn body(&self, entity: EntityRef) -> Option<&Entity> {
        match entity {
            EntityRef::Player(h) => self.players.get(h).map(|p| &p.tank.body),
            EntityRef::Enemy(h) => self.enemies.get(h).map(|e| &e.tank.body),
            EntityRef::Bullet(h) => self.bullets.get(h).map(|b| &b.body),
            EntityRef::Wall(h) => self.walls.get(h),
            EntityRef::Destructible(h) => self.destructibles.get(h).map(|d| &d.body),
            EntityRef::PowerUp(h) => self.power_ups.get(h).map(|p| &p.body),
        }
    }

    pub fn body_mut(&mut self, entity: EntityRef) -> Option<&mut Entity> {
        match entity {
            EntityRef::Player(h) => self.players.get_mut(h).map(|p| &mut p.tank.body),
            EntityRef::Enemy(h) => self.enemies.get_mut(h).map(|e| &mut e.tank.body),
            EntityRef::Bullet(h) => self.bullets.get_mut(h).map(|b| &mut b.body),
            EntityRef::Wall(h) => self.walls.get_mut(h),
            EntityRef::Destructible(h) => self.destructibles.get_mut(h).map(|d| &mut d.body),
            EntityRef::PowerUp(h) => self.power_ups.get_mut(h).map(|p| &mut p.body),
        }
    }

    pub fn is_collidable(&self, entity: EntityRef) -> bool {
        self.body(entity).is_some_and(|b| b.collidable())
    }

    fn award(&mut self, owner: Option<BulletOwner>, points: u32) {
        if let Some(BulletOwner::Player(h)) = owner {
            if let Some(player) = self.players.get_mut(h) {
                player.add_score(points);
            }
        }
    }

    /// Apply `amount` to a tank or prop. Returns true if the hit was lethal
    /// (or started a player's death transition).
    pub fn damage(&mut self, target: EntityRef, amount: i32, source: Option<BulletOwner>) -> bool {
        if amount <= 0 {
            return false;
        }
        match target {
            EntityRef::Player(h) => {
                let Some(player) = self.players.get_mut(h) else {
                    return false;
                };
                let died = player.take_damage(amount);
                if died {
                    let event = GameEvent::PlayerDied {
                        player: player.index,
                        lives: player.lives,
                    };
                    self.events.push(event);
                }
                died
            }
            EntityRef::Enemy(h) => {
                let Some(enemy) = self.enemies.get_mut(h) else {
                    return false;
                };
                if !enemy.alive() {
                    return false;
                }
                let killed = enemy.take_damage(amount);
                let points = enemy.points;
                if killed {
                    self.award(source, points);
                }
                killed
            }
            EntityRef::Destructible(h) => self
                .destructibles
                .get_mut(h)
                .is_some_and(|d| d.body.take_damage(amount)),
            EntityRef::Bullet(_) | EntityRef::Wall(_) | EntityRef::PowerUp(_) => false,
        }
    }

    /// Falloff damage around `center`.
    ///
    /// Skips the owner and anything already dead; player-side blasts never
    /// touch players.
    pub fn explode(
        &mut self,
        center: Vector2D,
        radius: f64,
        damage: i32,
        owner: Option<BulletOwner>,
        side: Side,
    ) {
        self.events.push(GameEvent::Explosion {
            position: center,
            radius,
        });

        let owner_ref = owner.map(|o| match o {
            BulletOwner::Player(h) => EntityRef::Player(h),
            BulletOwner::Enemy(h) => EntityRef::Enemy(h),
        });

        let mut targets: Vec<(EntityRef, Vector2D)> = Vec::new();
        if !CombatSystem::is_friendly_fire(side, Side::Player) {
            targets.extend(
                self.players
                    .iter()
                    .filter(|(_, p)| p.alive() && !p.respawning)
                    .map(|(h, p)| (EntityRef::Player(h), p.tank.center())),
            );
        }
        targets.extend(
            self.enemies
                .iter()
                .filter(|(_, e)| e.alive())
                .map(|(h, e)| (EntityRef::Enemy(h), e.center())),
        );
        targets.extend(
            self.destructibles
                .iter()
                .filter(|(_, d)| d.body.alive)
                .map(|(h, d)| (EntityRef::Destructible(h), d.body.center())),
        );

        for (target, position) in targets {
            if Some(target) == owner_ref {
                continue;
            }
            let amount = CombatSystem::explosion_damage(center.distance_to(position), radius, damage);
            if amount > 0 {
                self.damage(target, amount, owner);
            }
        }
    }

    /// Host reported an enemy kill; counted at the next cleanup
    pub fn apply_enemy_killed(&mut self, net_id: Uuid) -> bool {
        match self.find_enemy(net_id).and_then(|h| self.enemies.get_mut(h)) {
            Some(enemy) => {
                enemy.tank.body.destroy();
                true
            }
            None => false,
        }
    }

    pub fn apply_destructible_destroyed(&mut self, id: u32) -> bool {
        match self.find_destructible(id).and_then(|h| self.destructibles.get_mut(h)) {
            Some(prop) => {
                prop.body.destroy();
                true
            }
            None => false,
        }
    }

    /// Remove dead entities, count kills, and roll drops on the host
    pub fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        let retired = self.players.drain_where(|_, p| p.is_game_over());
        report.players_removed = retired.len();
        self.retired_score += retired.iter().map(|(_, p)| p.score).sum::<u32>();

        let dead_enemies = self.enemies.drain_where(|_, e| !e.alive());
        for (_, enemy) in dead_enemies {
            report.enemies_killed += 1;
            let position = enemy.center();
            self.events.push(GameEvent::EnemyDestroyed {
                net_id: enemy.net_id,
                enemy_type: enemy.enemy_type,
                position,
            });
            if self.authoritative {
                self.roll_power_up_drop(enemy.enemy_type, position);
            }
        }

        let dead_bullets: Vec<Handle> = self
            .bullets
            .iter()
            .filter(|(_, b)| !b.alive())
            .map(|(h, _)| h)
            .collect();
        for handle in &dead_bullets {
            self.release_owner_slot(*handle);
        }
        report.bullets_removed = self.bullets.drain_where(|_, b| !b.alive()).len();

        self.walls.drain_where(|_, w| !w.alive);

        for (_, prop) in self.destructibles.drain_where(|_, d| !d.body.alive) {
            self.events.push(GameEvent::DestructibleDestroyed {
                id: prop.id,
                kind: prop.kind,
                position: prop.body.center(),
            });
        }

        self.power_ups.drain_where(|_, p| !p.body.alive);

        if report.enemies_killed > 0 || report.players_removed > 0 {
            debug!(
                killed = report.enemies_killed,
                players_removed = report.players_removed,
                bullets = report.bullets_removed,
                "Cleanup pass"
            );
        }
        report
    }

    fn roll_power_up_drop(&mut self, enemy_type: EnemyType, position: Vector2D) {
        let drops = enemy_type.is_boss()
            || (enemy_type == EnemyType::Heavy && self.rng.gen::<f64>() < POWER_UP_DROP_CHANCE);
        if !drops {
            return;
        }
        let index = (self.rng.gen::<f64>() * DROPPABLE.len() as f64) as usize;
        let kind = DROPPABLE[index.min(DROPPABLE.len() - 1)];
        debug!(?kind, ?enemy_type, "Power-up dropped");
        self.power_ups.insert(PowerUpItem::new(position, kind));
    }

    /// True when nobody is left who can still play
    pub fn all_players_game_over(&self) -> bool {
        self.players.values().all(|p| p.is_game_over())
    }

    /// Final game score: every player's points, including retired ones
    pub fn total_score(&self) -> u32 {
        self.retired_score + self.players.values().map(|p| p.score).sum::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tank::Direction;

    fn world() -> World {
        let mut world = World::new(42, true);
        world.spawn_players(1);
        world
    }

    fn player_handle(world: &World) -> Handle {
        world.players.handles().next().expect("one player")
    }

    #[test]
    fn firing_occupies_slot_until_bullet_is_gone() {
        let mut w = world();
        let p = player_handle(&w);
        if let Some(pl) = w.players.get_mut(p) {
            pl.controls.fire = true;
        }
        w.sim_time_ms = 10_000.0;

        w.handle_firing();
        assert_eq!(w.bullets.len(), 1);
        let bullet = w.players.get(p).and_then(|pl| pl.tank.active_bullet);
        assert!(bullet.is_some());

        // Cooldown long expired but the slot is taken
        w.sim_time_ms = 20_000.0;
        w.handle_firing();
        assert_eq!(w.bullets.len(), 1);

        w.retire_bullet(bullet.expect("bullet in slot"));
        assert!(w.players.get(p).is_some_and(|pl| pl.tank.active_bullet.is_none()));
        w.handle_firing();
        assert_eq!(w.bullets.len(), 2);
    }

    #[test]
    fn player_shot_is_announced_with_local_index() {
        let mut w = world();
        let p = player_handle(&w);
        if let Some(pl) = w.players.get_mut(p) {
            pl.controls.fire = true;
        }
        w.sim_time_ms = 5_000.0;
        w.handle_firing();
        let events = w.drain_events();
        assert!(matches!(
            events.as_slice(),
            [GameEvent::BulletFired {
                local_player: Some(0),
                side: Side::Player,
                ..
            }]
        ));
    }

    #[test]
    fn bullet_leaving_arena_frees_slot() {
        let mut w = world();
        let p = player_handle(&w);
        let spawn = BulletSpawn {
            position: Vector2D::new(400.0, 2.0),
            direction: Direction::Up.unit(),
            kind: BulletKind::Standard,
            piercing: false,
        };
        w.create_bullet(spawn, BulletOwner::Player(p));
        for _ in 0..10 {
            w.update_bullets(1.0 / 60.0);
        }
        assert!(w.players.get(p).is_some_and(|pl| pl.tank.active_bullet.is_none()));
        let report = w.cleanup();
        assert_eq!(report.bullets_removed, 1);
        assert!(w.bullets.is_empty());
    }

    #[test]
    fn explosion_spares_owner_and_players_on_player_side() {
        let mut w = world();
        let p = player_handle(&w);
        let center = w.players.get(p).map(|pl| pl.tank.center()).unwrap_or_default();

        let near = w.spawn_enemy(SpawnOrder {
            enemy_type: EnemyType::Heavy,
            position: center + Vector2D::new(-16.0 + 40.0, -16.0),
        });
        let boss = w.spawn_enemy(SpawnOrder {
            enemy_type: EnemyType::Boss,
            position: center + Vector2D::new(-24.0, -24.0 - 60.0),
        });

        // Player-side blast centered on the player
        w.explode(center, 80.0, 2, Some(BulletOwner::Player(p)), Side::Player);
        assert!(w.players.get(p).is_some_and(|pl| pl.lives == 4 && pl.alive()));
        let heavy_health = w.enemies.get(near).map(|e| e.tank.body.health);
        // 40px from the blast: ceil(0.5 * 2 * 1.5) = 2
        assert_eq!(heavy_health, Some(1));

        // 60px away: ceil(0.25 * 3) = 1
        assert_eq!(w.enemies.get(boss).map(|e| e.tank.body.health), Some(9));

        // Enemy-side blast from the boss hits the player but not the boss
        let boss_center = w.enemies.get(boss).map(|e| e.center()).unwrap_or_default();
        w.explode(boss_center, 80.0, 2, Some(BulletOwner::Enemy(boss)), Side::Enemy);
        assert!(w.players.get(p).is_some_and(|pl| pl.lives == 3));
        assert_eq!(w.enemies.get(boss).map(|e| e.tank.body.health), Some(9));
    }

    #[test]
    fn enemy_kills_score_for_the_shooter_and_count_at_cleanup() {
        let mut w = world();
        let p = player_handle(&w);
        let e = w.spawn_enemy(SpawnOrder {
            enemy_type: EnemyType::Basic,
            position: Vector2D::new(300.0, 200.0),
        });
        assert!(w.damage(EntityRef::Enemy(e), 1, Some(BulletOwner::Player(p))));
        assert_eq!(w.players.get(p).map(|pl| pl.score), Some(100));
        // Still in the arena until cleanup
        assert_eq!(w.enemies.len(), 1);
        assert_eq!(w.census().alive, 0);

        let report = w.cleanup();
        assert_eq!(report.enemies_killed, 1);
        assert!(w.enemies.is_empty());
        assert!(w
            .drain_events()
            .iter()
            .any(|ev| matches!(ev, GameEvent::EnemyDestroyed { .. })));
    }

    #[test]
    fn boss_kills_always_drop_on_the_host() {
        let mut w = world();
        let e = w.spawn_enemy(SpawnOrder {
            enemy_type: EnemyType::Flamethrower,
            position: Vector2D::new(300.0, 200.0),
        });
        w.damage(EntityRef::Enemy(e), 100, None);
        w.cleanup();
        assert_eq!(w.power_ups.len(), 1);

        let mut peer = World::new(42, false);
        let e = peer.spawn_mirrored_enemy(Uuid::new_v4(), EnemyType::Boss, Vector2D::new(1.0, 1.0));
        peer.damage(EntityRef::Enemy(e), 100, None);
        peer.cleanup();
        assert!(peer.power_ups.is_empty());
    }

    #[test]
    fn game_over_players_leave_the_roster() {
        let mut w = world();
        let p = player_handle(&w);
        if let Some(pl) = w.players.get_mut(p) {
            pl.lives = 0;
            pl.tank.body.alive = false;
            pl.score = 700;
        }
        assert!(w.all_players_game_over());
        let report = w.cleanup();
        assert_eq!(report.players_removed, 1);
        assert!(w.players.is_empty());
        assert!(w.all_players_game_over());
        assert_eq!(w.total_score(), 700);
    }

    #[test]
    fn remote_kill_and_prop_destruction_apply_by_id() {
        let mut w = World::new(7, false);
        w.load_layout(StageLayout::City);
        let id = Uuid::new_v4();
        w.spawn_mirrored_enemy(id, EnemyType::Fast, Vector2D::new(200.0, 200.0));
        assert!(w.apply_enemy_killed(id));
        assert!(!w.apply_enemy_killed(Uuid::new_v4()));
        assert!(w.apply_destructible_destroyed(5));
        let report = w.cleanup();
        assert_eq!(report.enemies_killed, 1);
        assert_eq!(w.destructibles.len(), 23);
        assert!(w.find_destructible(5).is_none());
    }

    #[test]
    fn seeded_worlds_issue_identical_ids() {
        let mut a = World::new(9, true);
        let mut b = World::new(9, true);
        let id = a.next_id();
        assert_eq!(id, b.next_id());
        assert_eq!(id.get_version_num(), 4);
    }
}
