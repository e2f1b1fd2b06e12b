//! Read-only views of the match for rendering, HUD, debug overlay and peers

use serde::Serialize;

use super::bullet::{Bullet, BulletKind};
use super::director::{Census, StageDirector};
use super::entity::EntityRef;
use super::player::Player;
use super::r#match::{MatchPhase, MatchState};
use super::stage::StageLayout;
use super::vector::Vector2D;
use super::world::World;
use crate::net::protocol::{EnemyState, FullGameState, PlayerStateData};

/// Lifetime of an explosion flash (ms)
pub const EXPLOSION_EFFECT_MS: f64 = 500.0;
/// Lifetime of a bullet impact spark (ms)
pub const IMPACT_EFFECT_MS: f64 = 200.0;
/// Invulnerable players blink with this period (ms)
const FLASH_PERIOD_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Explosion,
    Impact,
}

/// Short-lived visual with no simulation presence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effect {
    pub kind: EffectKind,
    pub position: Vector2D,
    pub radius: f64,
    pub remaining_ms: f64,
}

impl Effect {
    pub fn explosion(position: Vector2D, radius: f64) -> Self {
        Self {
            kind: EffectKind::Explosion,
            position,
            radius,
            remaining_ms: EXPLOSION_EFFECT_MS,
        }
    }

    pub fn impact(position: Vector2D) -> Self {
        Self {
            kind: EffectKind::Impact,
            position,
            radius: 6.0,
            remaining_ms: IMPACT_EFFECT_MS,
        }
    }

    pub fn sprite(&self) -> &'static str {
        match self.kind {
            EffectKind::Explosion => "explosion",
            EffectKind::Impact => "impact",
        }
    }
}

/// Count effects down and drop the finished ones
pub fn tick_effects(effects: &mut Vec<Effect>, dt: f64) {
    for effect in effects.iter_mut() {
        effect.remaining_ms -= dt * 1000.0;
    }
    effects.retain(|e| e.remaining_ms > 0.0);
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteView {
    pub entity: EntityRef,
    pub sprite: &'static str,
    pub position: Vector2D,
    pub size: Vector2D,
    pub rotation: f64,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowView {
    pub id: String,
    pub label: String,
    pub sprite: &'static str,
    pub position: Vector2D,
    pub rotation: f64,
    pub health: i32,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub background: &'static str,
    pub sprites: Vec<SpriteView>,
    pub shadows: Vec<ShadowView>,
    pub effects: Vec<Effect>,
}

pub fn player_sprite(index: usize) -> &'static str {
    match index % 3 {
        0 => "player1",
        1 => "player2",
        _ => "player3",
    }
}

pub fn bullet_sprite(kind: BulletKind) -> &'static str {
    match kind {
        BulletKind::Missile => "missile",
        BulletKind::Fireball => "fireball",
        BulletKind::Flame => "flame",
        _ => "bullet",
    }
}

fn bullet_view(entity: EntityRef, bullet: &Bullet) -> SpriteView {
    SpriteView {
        entity,
        sprite: bullet_sprite(bullet.kind),
        position: bullet.body.position,
        size: bullet.body.size,
        rotation: bullet.rotation(),
        visible: bullet.body.visible,
    }
}

fn flashing(player: &Player, sim_time_ms: f64) -> bool {
    player.invulnerable && ((sim_time_ms / FLASH_PERIOD_MS) as u64) % 2 == 1
}

impl Scene {
    /// Live entities in draw order: props, pickups, enemies, players, bullets
    pub fn build(state: &MatchState, now_ms: f64) -> Self {
        let world = &state.world;
        let mut sprites = Vec::new();

        for (h, prop) in world.destructibles.iter().filter(|(_, d)| d.body.alive) {
            sprites.push(SpriteView {
                entity: EntityRef::Destructible(h),
                sprite: prop.kind.as_str(),
                position: prop.body.position,
                size: prop.body.size,
                rotation: 0.0,
                visible: prop.body.visible,
            });
        }
        for (h, item) in world.power_ups.iter().filter(|(_, p)| p.body.alive) {
            sprites.push(SpriteView {
                entity: EntityRef::PowerUp(h),
                sprite: "powerup",
                position: item.body.position,
                size: item.body.size,
                rotation: 0.0,
                visible: true,
            });
        }
        for (h, enemy) in world.enemies.iter().filter(|(_, e)| e.alive()) {
            sprites.push(SpriteView {
                entity: EntityRef::Enemy(h),
                sprite: enemy.enemy_type.sprite(),
                position: enemy.tank.body.position,
                size: enemy.tank.body.size,
                rotation: enemy.tank.rotation(),
                visible: enemy.tank.body.visible,
            });
        }
        for (h, player) in world.players.iter().filter(|(_, p)| p.alive()) {
            sprites.push(SpriteView {
                entity: EntityRef::Player(h),
                sprite: player_sprite(player.index),
                position: player.tank.body.position,
                size: player.tank.body.size,
                rotation: player.tank.rotation(),
                visible: player.tank.body.visible && !flashing(player, world.sim_time_ms),
            });
        }
        for (h, bullet) in world.bullets.iter().filter(|(_, b)| b.alive()) {
            sprites.push(bullet_view(EntityRef::Bullet(h), bullet));
        }

        let shadows = state
            .shadows
            .visible(now_ms)
            .into_iter()
            .map(|s| ShadowView {
                id: s.id.clone(),
                label: s.label(),
                sprite: s.sprite(),
                position: Vector2D::new(s.x, s.y),
                rotation: s.rotation,
                health: s.health,
            })
            .collect();

        Self {
            background: state.director.layout().background(),
            sprites,
            shadows,
            effects: state.effects.clone(),
        }
    }
}

/// UI text state, refreshed on the UI cadence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hud {
    pub phase: &'static str,
    pub stage: u32,
    pub score: u32,
    pub lives: Vec<i32>,
    pub enemies_remaining: u32,
    pub enemies_alive: usize,
    pub boss_battle: bool,
    pub remote_players: usize,
}

impl Hud {
    pub fn from_state(state: &MatchState, now_ms: f64) -> Self {
        let mut players: Vec<&Player> = state.world.players.values().collect();
        players.sort_by_key(|p| p.index);

        Self {
            phase: match state.phase {
                MatchPhase::Playing => "playing",
                MatchPhase::Paused => "paused",
                MatchPhase::GameOver => "game_over",
            },
            stage: state.director.stage,
            score: match state.phase {
                MatchPhase::GameOver => state.game_score,
                _ => state.world.total_score(),
            },
            lives: players.iter().map(|p| p.lives.max(0)).collect(),
            enemies_remaining: state.director.remaining(),
            enemies_alive: state.world.census().alive,
            boss_battle: state.director.boss_battle_phase,
            remote_players: state.shadows.visible(now_ms).len(),
        }
    }
}

/// Entity counts and director state for the debug overlay
#[derive(Debug, Clone, PartialEq)]
pub struct DebugSnapshot {
    pub frame: u64,
    pub fps: f64,
    pub players: usize,
    pub enemies: usize,
    pub bullets: usize,
    pub walls: usize,
    pub destructibles: usize,
    pub power_ups: usize,
    pub census: Census,
    pub stage: u32,
    pub killed: u32,
    pub spawn_timer_ms: f64,
}

impl DebugSnapshot {
    pub fn capture(state: &MatchState, frame: u64, dt: f64) -> Self {
        let world = &state.world;
        Self {
            frame,
            fps: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            players: world.players.len(),
            enemies: world.enemies.len(),
            bullets: world.bullets.len(),
            walls: world.walls.len(),
            destructibles: world.destructibles.len(),
            power_ups: world.power_ups.len(),
            census: world.census(),
            stage: state.director.stage,
            killed: state.director.total_enemies_killed,
            spawn_timer_ms: state.director.spawn_timer_ms,
        }
    }
}

pub fn player_state(player: &Player) -> PlayerStateData {
    PlayerStateData {
        x: player.tank.body.position.x,
        y: player.tank.body.position.y,
        direction: Some(player.tank.direction.index()),
        facing: Some(player.tank.facing.index()),
        rotation: Some(player.tank.rotation()),
        health: Some(player.tank.body.health),
        lives: Some(player.lives),
        alive: player.alive(),
        respawning: player.respawning,
    }
}

/// Network id of local player `index`; the first one uses the bare id
pub fn local_player_id(base: &str, index: usize) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{base}-{index}")
    }
}

/// Host baseline of the stage, its enemies and standing props.
///
/// Enemies killed since the last cleanup are listed with zero health so the
/// receiver still counts them.
pub fn full_game_state(world: &World, director: &StageDirector, player_id: &str) -> FullGameState {
    let mut players: Vec<&Player> = world.players.values().collect();
    players.sort_by_key(|p| p.index);

    FullGameState {
        stage: director.stage,
        total_enemies_killed: director.total_enemies_killed,
        enemies_needed_to_win: director.enemies_needed_to_win,
        boss_battle_phase: director.boss_battle_phase,
        enemies: world
            .enemies
            .values()
            .map(|e| EnemyState {
                enemy_id: e.net_id,
                enemy_type: e.enemy_type,
                x: e.tank.body.position.x,
                y: e.tank.body.position.y,
                health: if e.alive() { e.tank.body.health } else { 0 },
                direction: e.tank.direction.index(),
            })
            .collect(),
        destructibles: world
            .destructibles
            .values()
            .filter(|d| d.body.alive)
            .map(|d| d.id)
            .collect(),
        players: players
            .iter()
            .map(|p| (local_player_id(player_id, p.index), player_state(p)))
            .collect(),
    }
}

/// Layout a full sync refers to
pub fn layout_of(state: &FullGameState) -> StageLayout {
    StageLayout::resolve(state.stage)
}
