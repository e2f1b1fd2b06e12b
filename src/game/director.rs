//! Spawn & stage director: enemy composition, boss phases, stage progression
//!
//! Only the authoritative participant drives spawning. Kills are reported
//! back through [`StageDirector::record_kills`] by the cleanup pass.

use rand::Rng;
use std::collections::VecDeque;
use tracing::{debug, info};

use super::enemy::EnemyType;
use super::stage::{
    StageLayout, INITIAL_MARKER_SPAWNS, MARKER_STAGGER_MS, RANDOM_SPAWN_POOL, SPAWN_MARKERS,
};
use super::vector::Vector2D;

pub const ENEMIES_NEEDED_TO_WIN: u32 = 20;
pub const INITIAL_SPAWN_DELAY_MS: f64 = 3000.0;
pub const DEFAULT_MAX_ENEMIES: usize = 4;

/// Kill fraction after which stage 1 may roll a boss
const STAGE1_BOSS_THRESHOLD: f64 = 0.5;
const STAGE1_BOSS_CHANCE: f64 = 0.15;
const STAGE1_MAX_BOSSES: usize = 2;
/// Kill fraction that forces the stage 2 boss phase
const STAGE2_BOSS_THRESHOLD: f64 = 0.8;
const STAGE2_MAX_FLAMES: usize = 4;

const NORMAL_POOL: [EnemyType; 3] = [EnemyType::Basic, EnemyType::Fast, EnemyType::Heavy];

/// Living enemy population by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Census {
    pub alive: usize,
    pub bosses: usize,
    pub flames: usize,
    pub flamethrowers: usize,
}

impl Census {
    pub fn from_types(types: impl IntoIterator<Item = EnemyType>) -> Self {
        let mut census = Self::default();
        for enemy_type in types {
            census.record(enemy_type);
        }
        census
    }

    fn record(&mut self, enemy_type: EnemyType) {
        self.alive += 1;
        match enemy_type {
            EnemyType::Boss => self.bosses += 1,
            EnemyType::Flame => self.flames += 1,
            EnemyType::Flamethrower => self.flamethrowers += 1,
            EnemyType::Basic | EnemyType::Fast | EnemyType::Heavy => {}
        }
    }
}

/// Enemy the director wants created this evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnOrder {
    pub enemy_type: EnemyType,
    /// Top-left of the new tank
    pub position: Vector2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    StageCleared,
    AllPlayersDefeated,
}

/// `floor(rng * len)`, the same draw for positions and enemy kinds
fn pick<'a, T, R: Rng>(items: &'a [T], rng: &mut R) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    let index = (rng.gen::<f64>() * items.len() as f64) as usize;
    items.get(index.min(items.len() - 1))
}

#[derive(Debug, Clone)]
pub struct StageDirector {
    pub stage: u32,
    pub total_enemies_killed: u32,
    pub enemies_needed_to_win: u32,
    pub max_enemies: usize,
    default_max_enemies: usize,
    pub boss_battle_phase: bool,
    pub spawn_timer_ms: f64,
    pub spawn_delay_ms: f64,
    /// Next unused entry of `SPAWN_MARKERS`
    spawn_index: usize,
    /// Marker spawns waiting for their stagger time (sim ms)
    staggered: VecDeque<(f64, Vector2D)>,
}

impl StageDirector {
    pub fn new(default_max_enemies: usize) -> Self {
        Self {
            stage: 1,
            total_enemies_killed: 0,
            enemies_needed_to_win: ENEMIES_NEEDED_TO_WIN,
            max_enemies: default_max_enemies,
            default_max_enemies,
            boss_battle_phase: false,
            spawn_timer_ms: 0.0,
            spawn_delay_ms: INITIAL_SPAWN_DELAY_MS,
            spawn_index: 0,
            staggered: VecDeque::new(),
        }
    }

    pub fn layout(&self) -> StageLayout {
        StageLayout::resolve(self.stage)
    }

    pub fn remaining(&self) -> u32 {
        self.enemies_needed_to_win
            .saturating_sub(self.total_enemies_killed)
    }

    /// Queue the opening marker spawns, staggered from `now_ms`
    pub fn begin_stage(&mut self, now_ms: f64) {
        self.staggered.clear();
        for (i, &(x, y)) in SPAWN_MARKERS.iter().take(INITIAL_MARKER_SPAWNS).enumerate() {
            self.staggered
                .push_back((now_ms + i as f64 * MARKER_STAGGER_MS, Vector2D::new(x, y)));
        }
        self.spawn_index = INITIAL_MARKER_SPAWNS;
        self.spawn_timer_ms = 0.0;
    }

    /// Fresh game: stage 1 with initial pacing
    pub fn reset(&mut self) {
        self.stage = 1;
        self.total_enemies_killed = 0;
        self.boss_battle_phase = false;
        self.max_enemies = self.default_max_enemies;
        self.spawn_delay_ms = INITIAL_SPAWN_DELAY_MS;
        self.spawn_timer_ms = 0.0;
        self.spawn_index = 0;
        self.staggered.clear();
    }

    /// Move to the next stage; each stage spawns faster down to a floor of 2 s
    pub fn advance_stage(&mut self) {
        self.stage += 1;
        self.total_enemies_killed = 0;
        self.boss_battle_phase = false;
        self.max_enemies = self.default_max_enemies;
        self.spawn_delay_ms = (5000.0 - self.stage as f64 * 500.0).max(2000.0);
        self.spawn_timer_ms = 0.0;
        self.staggered.clear();
        info!(
            stage = self.stage,
            spawn_delay_ms = self.spawn_delay_ms,
            "Advancing to next stage"
        );
    }

    pub fn record_kills(&mut self, kills: u32) {
        self.total_enemies_killed += kills;
    }

    /// Jump the kill counter to the stage 2 boss threshold
    pub fn force_boss_threshold(&mut self) {
        self.total_enemies_killed =
            (self.enemies_needed_to_win as f64 * STAGE2_BOSS_THRESHOLD).floor() as u32;
        self.boss_battle_phase = false;
        info!(
            killed = self.total_enemies_killed,
            "Kill counter moved to boss threshold"
        );
    }

    /// Win/lose evaluation; losing takes precedence over clearing
    pub fn check_conditions(&self, all_players_game_over: bool) -> StageOutcome {
        if all_players_game_over {
            StageOutcome::AllPlayersDefeated
        } else if self.total_enemies_killed >= self.enemies_needed_to_win {
            StageOutcome::StageCleared
        } else {
            StageOutcome::Continue
        }
    }

    fn kill_fraction_reached(&self, fraction: f64) -> bool {
        self.total_enemies_killed as f64 >= self.enemies_needed_to_win as f64 * fraction
    }

    /// Enter the stage 2 boss phase once the threshold is crossed with no
    /// flamethrower on the field.
    ///
    /// The phase is left only through a stage change: a boss killed before
    /// the stage is cleared is replaced by another one.
    fn check_boss_phase(&mut self, census: &Census) {
        if self.stage == 2
            && !self.boss_battle_phase
            && census.flamethrowers == 0
            && self.kill_fraction_reached(STAGE2_BOSS_THRESHOLD)
        {
            self.boss_battle_phase = true;
            self.max_enemies = 1;
            info!(
                stage = self.stage,
                killed = self.total_enemies_killed,
                needed = self.enemies_needed_to_win,
                "Boss battle phase activated"
            );
        }
    }

    /// Kinds eligible for the next spawn, or `None` when spawning is suppressed
    pub fn spawn_pool<R: Rng>(&mut self, census: &Census, rng: &mut R) -> Option<Vec<EnemyType>> {
        match self.stage {
            1 => {
                if census.bosses < STAGE1_MAX_BOSSES
                    && self.kill_fraction_reached(STAGE1_BOSS_THRESHOLD)
                    && rng.gen::<f64>() < STAGE1_BOSS_CHANCE
                {
                    Some(vec![EnemyType::Boss])
                } else {
                    Some(NORMAL_POOL.to_vec())
                }
            }
            2 => {
                self.check_boss_phase(census);
                if self.boss_battle_phase {
                    if census.flamethrowers == 0 {
                        Some(vec![EnemyType::Flamethrower])
                    } else {
                        debug!("Boss phase active with boss present, not spawning");
                        None
                    }
                } else if census.flames < STAGE2_MAX_FLAMES {
                    Some(vec![EnemyType::Flame, EnemyType::Flame, EnemyType::Basic])
                } else {
                    Some(vec![EnemyType::Basic, EnemyType::Fast])
                }
            }
            _ => Some(NORMAL_POOL.to_vec()),
        }
    }

    /// Marker queue first, then uniform over the random pool
    pub fn next_spawn_position<R: Rng>(&mut self, rng: &mut R) -> Vector2D {
        if let Some(&(x, y)) = SPAWN_MARKERS.get(self.spawn_index) {
            self.spawn_index += 1;
            return Vector2D::new(x, y);
        }
        let &(x, y) = pick(&RANDOM_SPAWN_POOL, rng).unwrap_or(&RANDOM_SPAWN_POOL[0]);
        Vector2D::new(x, y)
    }

    fn try_spawn_at<R: Rng>(
        &mut self,
        position: Vector2D,
        census: &mut Census,
        rng: &mut R,
    ) -> Option<SpawnOrder> {
        if census.alive >= self.max_enemies {
            return None;
        }
        let pool = self.spawn_pool(census, rng)?;
        let enemy_type = *pick(&pool, rng)?;
        census.record(enemy_type);
        debug!(
            stage = self.stage,
            ?enemy_type,
            killed = self.total_enemies_killed,
            alive = census.alive,
            max = self.max_enemies,
            "Spawning enemy"
        );
        Some(SpawnOrder {
            enemy_type,
            position,
        })
    }

    /// One spawn evaluation. `dt` is the already-compensated step in seconds.
    pub fn update<R: Rng>(
        &mut self,
        dt: f64,
        now_ms: f64,
        mut census: Census,
        rng: &mut R,
    ) -> Vec<SpawnOrder> {
        let mut orders = Vec::new();

        while let Some(&(due, position)) = self.staggered.front() {
            if due > now_ms {
                break;
            }
            self.staggered.pop_front();
            if let Some(order) = self.try_spawn_at(position, &mut census, rng) {
                orders.push(order);
            }
        }

        self.spawn_timer_ms += dt * 1000.0;
        self.check_boss_phase(&census);

        if self.boss_battle_phase && census.alive > 0 {
            return orders;
        }

        if self.spawn_timer_ms >= self.spawn_delay_ms
            && census.alive < self.max_enemies
            && self.total_enemies_killed < self.enemies_needed_to_win
        {
            let position = self.next_spawn_position(rng);
            if let Some(order) = self.try_spawn_at(position, &mut census, rng) {
                orders.push(order);
            }
            self.spawn_timer_ms = 0.0;
        }

        orders
    }
}

impl Default for StageDirector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENEMIES)
    }
}
