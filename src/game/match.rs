//! Match orchestration - phases, per-frame update and the run loop

use std::any::Any;
use std::collections::{BTreeSet, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::arena::Handle;
use super::bullet::BulletKind;
use super::collision::CollisionSystem;
use super::director::{StageDirector, StageOutcome};
use super::enemy::EnemyType;
use super::entity::EntityRef;
use super::player::Player;
use super::scheduler::{FramePlan, FrameScheduler};
use super::snapshot::{self, DebugSnapshot, Effect, Hud, Scene};
use super::tank::Direction;
use super::vector::Vector2D;
use super::world::{GameEvent, World};
use super::SimError;
use crate::collab::{AudioSink, DebugKeys, FrameInput, InputSource, RenderSink};
use crate::config::Config;
use crate::net::protocol::{Envelope, FullGameState, NetMsg};
use crate::net::shadow::ShadowMap;
use crate::net::{Inbox, NetRole, NetworkAuthority, Transport};
use crate::util::time::{tick_duration, Clock, DEFAULT_TARGET_FPS};

const MUSIC_TRACK: &str = "music_stage";
const MUSIC_VOLUME: f64 = 0.3;
const SHOOT_VOLUME: f64 = 0.3;
const FLAMETHROWER_VOLUME: f64 = 0.6;
const EXPLODE_VOLUME: f64 = 0.5;
/// Blast drawn where an enemy was removed
const WRECK_EFFECT_RADIUS: f64 = 24.0;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Playing,
    Paused,
    GameOver,
}

/// Static match parameters
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub local_players: usize,
    pub max_enemies: usize,
    pub seed: u64,
    pub role: NetRole,
    pub player_id: String,
    pub target_fps: u32,
    /// End `run` when every player is out instead of waiting for a restart
    pub stop_on_game_over: bool,
}

impl MatchSettings {
    pub fn from_config(config: &Config, seed: u64) -> Self {
        Self {
            local_players: config.local_players,
            max_enemies: config.max_enemies,
            seed,
            role: config.net_role,
            player_id: config.player_id.clone(),
            target_fps: config.target_fps,
            stop_on_game_over: true,
        }
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            local_players: 1,
            max_enemies: super::director::DEFAULT_MAX_ENEMIES,
            seed: 0,
            role: NetRole::Offline,
            player_id: "host".to_string(),
            target_fps: DEFAULT_TARGET_FPS,
            stop_on_game_over: false,
        }
    }
}

/// Whole simulation state of one match
pub struct MatchState {
    pub world: World,
    pub director: StageDirector,
    pub authority: NetworkAuthority,
    pub shadows: ShadowMap,
    pub phase: MatchPhase,
    pub local_players: usize,
    /// Sum of player scores, frozen at game over
    pub game_score: u32,
    pub effects: Vec<Effect>,
}

impl MatchState {
    pub fn new(settings: &MatchSettings) -> Self {
        Self {
            world: World::new(settings.seed, settings.role.is_authoritative()),
            director: StageDirector::new(settings.max_enemies),
            authority: NetworkAuthority::new(settings.role, settings.player_id.clone()),
            shadows: ShadowMap::new(),
            phase: MatchPhase::Playing,
            local_players: settings.local_players,
            game_score: 0,
            effects: Vec::new(),
        }
    }

    /// Fresh roster, stage 1
    pub fn reset_game(&mut self, now_ms: f64) {
        self.phase = MatchPhase::Playing;
        self.game_score = 0;
        self.world.spawn_players(self.local_players);
        // A peer rejoins whatever stage the host is on
        if self.authority.runs_director() || self.world.walls.is_empty() {
            self.director.reset();
            self.setup_stage(now_ms);
        }
        info!(
            players = self.local_players,
            role = ?self.authority.role,
            "New game started"
        );
    }

    /// Load the current stage's layout and restart its spawn schedule
    pub fn setup_stage(&mut self, now_ms: f64) {
        let layout = self.director.layout();
        self.world.clear_combatants();
        self.world.load_layout(layout);
        for player in self.world.players.values_mut() {
            if !player.is_game_over() {
                player.reset_to_spawn_point();
            }
        }
        self.effects.clear();
        if self.authority.runs_director() {
            self.director.begin_stage(self.world.sim_time_ms);
        }
        self.authority.schedule_full_sync(now_ms);
        info!(
            stage = self.director.stage,
            background = layout.background(),
            "Stage ready"
        );
    }

    pub fn next_stage(&mut self, now_ms: f64) {
        self.director.advance_stage();
        self.setup_stage(now_ms);
    }

    /// One frame of simulation. Inbound messages are applied first, whole.
    pub fn update(
        &mut self,
        plan: &FramePlan,
        input: &FrameInput,
        inbound: Vec<Envelope>,
        now_ms: f64,
    ) -> Vec<GameEvent> {
        self.apply_inbound(inbound, now_ms);

        match self.phase {
            MatchPhase::Playing if input.pause => {
                self.phase = MatchPhase::Paused;
                info!("Game paused");
            }
            MatchPhase::Playing => self.step(plan, input, now_ms),
            MatchPhase::Paused => {
                if input.pause {
                    self.phase = MatchPhase::Playing;
                    info!("Game resumed");
                }
            }
            MatchPhase::GameOver => {
                if input.fire {
                    info!("Restarting after game over");
                    self.reset_game(now_ms);
                }
            }
        }

        let events = self.world.drain_events();
        self.authority.observe(&events);
        for event in &events {
            match *event {
                GameEvent::Explosion { position, radius } => {
                    self.effects.push(Effect::explosion(position, radius))
                }
                GameEvent::Impact { position } => self.effects.push(Effect::impact(position)),
                GameEvent::EnemyDestroyed { position, .. } => {
                    self.effects
                        .push(Effect::explosion(position, WRECK_EFFECT_RADIUS))
                }
                _ => {}
            }
        }
        if self.phase != MatchPhase::Paused {
            snapshot::tick_effects(&mut self.effects, plan.dt);
        }

        if self.authority.take_full_sync_due(now_ms) {
            let state =
                snapshot::full_game_state(&self.world, &self.director, &self.authority.player_id);
            self.authority.queue(NetMsg::FullGameState { state });
        }

        events
    }

    fn step(&mut self, plan: &FramePlan, input: &FrameInput, now_ms: f64) {
        self.handle_debug_keys(&input.debug, now_ms);

        let dt = plan.dt;
        self.world.advance_clock(dt);

        for player in self.world.players.values_mut() {
            let controls = input.controls.get(player.index).copied().unwrap_or_default();
            player.set_controls(controls);
        }
        self.world.update_players(dt);
        self.world.update_bullets(dt);
        self.world.handle_firing();

        if let Some(ai_dt) = plan.ai_dt {
            self.world.update_enemies(ai_dt);
            if self.authority.runs_director() {
                let census = self.world.census();
                let now = self.world.sim_time_ms;
                let orders = self.director.update(ai_dt, now, census, &mut self.world.rng);
                for order in orders {
                    self.world.spawn_enemy(order);
                }
            }
        }

        if let Some(physics_dt) = plan.physics_dt {
            CollisionSystem::resolve(&mut self.world);
            self.world.update_statics(physics_dt);
        }

        if plan.cleanup {
            let report = self.world.cleanup();
            self.director.record_kills(report.enemies_killed);
        }

        if plan.check_conditions {
            match self
                .director
                .check_conditions(self.world.all_players_game_over())
            {
                StageOutcome::Continue => {}
                StageOutcome::StageCleared => {
                    // Peers follow the host's baseline instead
                    if self.authority.runs_director() {
                        info!(
                            stage = self.director.stage,
                            killed = self.director.total_enemies_killed,
                            "Stage cleared"
                        );
                        self.next_stage(now_ms);
                    }
                }
                StageOutcome::AllPlayersDefeated => self.game_over(),
            }
        }
    }

    fn handle_debug_keys(&mut self, keys: &DebugKeys, now_ms: f64) {
        let authoritative = self.authority.runs_director();
        if keys.next_stage && authoritative {
            info!(stage = self.director.stage, "Debug: skipping to next stage");
            self.next_stage(now_ms);
        }
        if keys.spawn_boss && authoritative {
            self.world.debug_spawn(EnemyType::Flamethrower);
        }
        if keys.reset_stage && authoritative {
            info!("Debug: resetting to stage 1");
            self.director.reset();
            self.setup_stage(now_ms);
        }
        if keys.force_boss {
            self.director.force_boss_threshold();
        }
        if keys.toggle_infinite_health {
            self.toggle_infinite_health();
        }
    }

    /// Flip the damage immunity of the first local player
    pub fn toggle_infinite_health(&mut self) -> Option<bool> {
        let player = self.world.players.values_mut().find(|p| p.index == 0)?;
        player.infinite_health = !player.infinite_health;
        info!(enabled = player.infinite_health, "Debug: infinite health toggled");
        Some(player.infinite_health)
    }

    fn game_over(&mut self) {
        if self.phase == MatchPhase::GameOver {
            return;
        }
        self.phase = MatchPhase::GameOver;
        self.game_score = self.world.total_score();
        info!(
            score = self.game_score,
            stage = self.director.stage,
            "Game over"
        );
    }

    fn is_local_id(&self, id: &str) -> bool {
        let base = self.authority.player_id.as_str();
        id == base
            || id
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Merge one frame's worth of peer messages
    pub fn apply_inbound(&mut self, batch: Vec<Envelope>, now_ms: f64) {
        let authority_events = self.authority.accepts_authority_events();

        for envelope in batch {
            let from = envelope.from;
            match envelope.msg {
                NetMsg::BulletFired {
                    bullet_id,
                    player_id,
                    kind,
                    x,
                    y,
                    dir_x,
                    dir_y,
                } => {
                    if self.authority.accepts_bullet_from(&player_id) {
                        self.world.spawn_network_bullet(
                            bullet_id,
                            kind,
                            Vector2D::new(x, y),
                            Vector2D::new(dir_x, dir_y),
                            player_id,
                        );
                    }
                }
                NetMsg::PlayerState { player_id, state } => {
                    if !self.is_local_id(&player_id) {
                        self.shadows.update_or_create(&player_id, &state, now_ms);
                    }
                }
                NetMsg::EnemySpawned {
                    enemy_id,
                    enemy_type,
                    x,
                    y,
                } if authority_events => {
                    if self.world.find_enemy(enemy_id).is_none() {
                        self.world
                            .spawn_mirrored_enemy(enemy_id, enemy_type, Vector2D::new(x, y));
                    }
                }
                NetMsg::EnemyKilled { enemy_id } if authority_events => {
                    if !self.world.apply_enemy_killed(enemy_id) {
                        debug!(%enemy_id, "Kill for unknown enemy ignored");
                    }
                }
                NetMsg::DestructibleDestroyed { id, kind } if authority_events => {
                    if !self.world.apply_destructible_destroyed(id) {
                        debug!(id, kind = kind.as_str(), "Destruction of unknown prop ignored");
                    }
                }
                NetMsg::FullGameState { state } if authority_events => {
                    self.apply_full_state(state, now_ms);
                }
                other => {
                    warn!(
                        peer = %from,
                        msg = other.name(),
                        "Ignoring authority message from non-host"
                    );
                }
            }
        }
    }

    /// Line up with the host's baseline
    fn apply_full_state(&mut self, state: FullGameState, now_ms: f64) {
        if state.stage != self.director.stage {
            self.director.stage = state.stage;
            self.world.clear_combatants();
            self.world.load_layout(snapshot::layout_of(&state));
        }
        self.director.total_enemies_killed = state.total_enemies_killed;
        self.director.enemies_needed_to_win = state.enemies_needed_to_win;
        self.director.boss_battle_phase = state.boss_battle_phase;

        let listed: HashSet<Uuid> = state.enemies.iter().map(|e| e.enemy_id).collect();
        let unlisted: Vec<Handle> = self
            .world
            .enemies
            .iter()
            .filter(|(_, e)| !listed.contains(&e.net_id))
            .map(|(h, _)| h)
            .collect();
        for handle in unlisted {
            self.world.enemies.remove(handle);
        }

        for entry in &state.enemies {
            let position = Vector2D::new(entry.x, entry.y);
            let handle = match self.world.find_enemy(entry.enemy_id) {
                Some(handle) => handle,
                None => self
                    .world
                    .spawn_mirrored_enemy(entry.enemy_id, entry.enemy_type, position),
            };
            if let Some(enemy) = self.world.enemies.get_mut(handle) {
                enemy.tank.body.set_position(entry.x, entry.y);
                enemy.tank.body.health = entry.health;
                enemy.tank.direction = Direction::from_index(entry.direction);
                enemy.tank.facing = enemy.tank.direction;
                // Killed on the host; our cleanup counts it
                if entry.health <= 0 {
                    enemy.tank.body.destroy();
                }
            }
        }

        let standing: HashSet<u32> = state.destructibles.iter().copied().collect();
        self.world
            .destructibles
            .drain_where(|_, d| !standing.contains(&d.id));

        for (id, data) in &state.players {
            if !self.is_local_id(id) {
                self.shadows.update_or_create(id, data, now_ms);
            }
        }

        info!(
            stage = state.stage,
            enemies = state.enemies.len(),
            killed = state.total_enemies_killed,
            "Applied full game state from host"
        );
    }

    /// Queue a position update for every local player
    pub fn queue_player_states(&mut self) {
        if !self.authority.role.is_multiplayer() {
            return;
        }
        let mut players: Vec<&Player> = self.world.players.values().collect();
        players.sort_by_key(|p| p.index);
        let messages: Vec<NetMsg> = players
            .iter()
            .map(|p| NetMsg::PlayerState {
                player_id: snapshot::local_player_id(&self.authority.player_id, p.index),
                state: snapshot::player_state(p),
            })
            .collect();
        for msg in messages {
            self.authority.queue(msg);
        }
    }
}

/// External collaborators owned by a running match
pub struct Collaborators {
    pub input: Box<dyn InputSource>,
    pub renderer: Box<dyn RenderSink>,
    pub audio: Box<dyn AudioSink>,
}

/// Handle for observing and stopping a match from outside
#[derive(Clone)]
pub struct MatchHandle {
    pub hud_tx: broadcast::Sender<Hud>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl MatchHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Hud> {
        self.hud_tx.subscribe()
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSummary {
    pub frames: u64,
    pub failed_frames: u64,
    pub stage: u32,
    pub score: u32,
    pub phase: MatchPhase,
}

/// A match wired to its clock and collaborators
pub struct GameMatch {
    pub state: MatchState,
    scheduler: FrameScheduler,
    settings: MatchSettings,
    clock: Arc<dyn Clock>,
    collab: Collaborators,
    transport: Option<Box<dyn Transport>>,
    inbox: Inbox,
    rendered: BTreeSet<EntityRef>,
    background: Option<&'static str>,
    hud_tx: broadcast::Sender<Hud>,
    stop_rx: watch::Receiver<bool>,
    failed_frames: u64,
}

impl GameMatch {
    pub fn new(
        settings: MatchSettings,
        collab: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> (Self, MatchHandle) {
        let (hud_tx, _) = broadcast::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = MatchHandle {
            hud_tx: hud_tx.clone(),
            stop_tx: Arc::new(stop_tx),
        };

        let game_match = Self {
            state: MatchState::new(&settings),
            scheduler: FrameScheduler::new(),
            settings,
            clock,
            collab,
            transport: None,
            inbox: Inbox::new(),
            rendered: BTreeSet::new(),
            background: None,
            hud_tx,
            stop_rx,
            failed_frames: 0,
        };

        (game_match, handle)
    }

    /// Attach a transport and the inbox its pump fills
    pub fn with_network(mut self, transport: Box<dyn Transport>, inbox: Inbox) -> Self {
        self.transport = Some(transport);
        self.inbox = inbox;
        self
    }

    pub fn failed_frames(&self) -> u64 {
        self.failed_frames
    }

    pub fn frame_count(&self) -> u64 {
        self.scheduler.frame_counter
    }

    /// Start the first game and its music
    pub fn start(&mut self) {
        let now_ms = self.clock.now_secs() * 1000.0;
        self.state.reset_game(now_ms);
        self.scheduler.reset_clock();
        *self.collab.renderer.camera_mut() = Vector2D::ZERO;
        self.collab.audio.play_music(MUSIC_TRACK, MUSIC_VOLUME, true);
    }

    /// Run one tick. Returns the plan, or `None` if the frame was skipped.
    pub fn frame(&mut self) -> Option<FramePlan> {
        let now = self.clock.now_secs();
        let plan = self.scheduler.begin_frame(now)?;
        let now_ms = now * 1000.0;

        self.collab.input.poll(now_ms);
        let input = FrameInput::read(self.collab.input.as_ref(), self.state.local_players);
        let inbound = self.inbox.drain();

        let state = &mut self.state;
        let events = match catch_phase("update", || state.update(&plan, &input, inbound, now_ms)) {
            Ok(events) => events,
            Err(e) => {
                self.failed_frames += 1;
                error!(frame = plan.frame, error = %e, "Frame update failed");
                Vec::new()
            }
        };
        self.collab.input.update_previous_keys();
        self.play_sounds(&events);

        if plan.network_sync {
            self.state.queue_player_states();
            if let Err(e) = self.flush_network() {
                warn!(frame = plan.frame, error = %e, "Network flush failed");
            }
        }

        if plan.refresh_ui {
            // No subscribers is fine
            let _ = self.hud_tx.send(Hud::from_state(&self.state, now_ms));
        }

        if plan.debug_snapshot {
            let snap = DebugSnapshot::capture(&self.state, plan.frame, plan.dt);
            debug!(
                frame = snap.frame,
                fps = %format!("{:.1}", snap.fps),
                stage = snap.stage,
                killed = snap.killed,
                enemies = snap.enemies,
                bullets = snap.bullets,
                destructibles = snap.destructibles,
                power_ups = snap.power_ups,
                "Debug snapshot"
            );
        }

        if plan.render {
            if let Err(e) = catch_phase("render", || self.render(now_ms)).and_then(|r| r) {
                self.failed_frames += 1;
                error!(frame = plan.frame, error = %e, "Frame render failed");
            }
        }

        Some(plan)
    }

    fn play_sounds(&mut self, events: &[GameEvent]) {
        for event in events {
            match event {
                GameEvent::BulletFired {
                    kind: BulletKind::Flame,
                    ..
                } => self
                    .collab
                    .audio
                    .play_sound("flamethrower", FLAMETHROWER_VOLUME),
                GameEvent::BulletFired { .. } => self.collab.audio.play_sound("shoot", SHOOT_VOLUME),
                GameEvent::Explosion { .. }
                | GameEvent::EnemyDestroyed { .. }
                | GameEvent::PlayerDied { .. } => {
                    self.collab.audio.play_sound("explode", EXPLODE_VOLUME)
                }
                _ => {}
            }
        }
    }

    /// Send everything queued; keeps going past failures and reports the first
    fn flush_network(&mut self) -> Result<(), SimError> {
        let outbox = self.state.authority.drain_outbox();
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };

        let from = &self.state.authority.player_id;
        let mut result = Ok(());
        for msg in outbox {
            if let Err(e) = transport.send(&Envelope::new(from.clone(), msg)) {
                if result.is_ok() {
                    result = Err(SimError::from(e));
                }
            }
        }
        result
    }

    fn render(&mut self, now_ms: f64) -> Result<(), SimError> {
        let scene = Scene::build(&self.state, now_ms);

        if self.background != Some(scene.background) {
            self.collab.renderer.set_background(scene.background);
            self.background = Some(scene.background);
        }

        let current: BTreeSet<EntityRef> = scene.sprites.iter().map(|s| s.entity).collect();
        for gone in self.rendered.difference(&current) {
            self.collab.renderer.remove_entity(*gone);
        }
        for sprite in &scene.sprites {
            if !self.rendered.contains(&sprite.entity) {
                self.collab.renderer.add_entity(sprite.entity, sprite.sprite);
            }
        }
        self.rendered = current;

        self.collab.renderer.render(&scene)?;
        Ok(())
    }

    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            frames: self.scheduler.frame_counter,
            failed_frames: self.failed_frames,
            stage: self.state.director.stage,
            score: match self.state.phase {
                MatchPhase::GameOver => self.state.game_score,
                _ => self.state.world.total_score(),
            },
            phase: self.state.phase,
        }
    }

    /// Tick until stopped (or game over when configured). Dropping every
    /// handle also stops the loop.
    pub async fn run(mut self) -> MatchSummary {
        info!(
            role = ?self.settings.role,
            players = self.settings.local_players,
            seed = self.settings.seed,
            "Match started"
        );
        self.start();

        let mut ticker = interval(tick_duration(self.settings.target_fps));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.stop_rx.changed() => {
                    info!(frames = self.scheduler.frame_counter, "Stop requested, ending match");
                    break;
                }
            }

            self.frame();

            if self.settings.stop_on_game_over && self.state.phase == MatchPhase::GameOver {
                info!(score = self.state.game_score, "Match ended");
                break;
            }
        }

        self.collab.audio.stop_music();
        if let Err(e) = self.flush_network() {
            debug!(error = %e, "Final network flush failed");
        }
        self.summary()
    }
}

/// Run a frame phase, turning a panic into a `SimError`
fn catch_phase<T>(phase: &'static str, f: impl FnOnce() -> T) -> Result<T, SimError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| SimError::Panicked {
        phase,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{AssetCatalog, CollabError, HeadlessRenderer, LogAudio, ScriptedInput};
    use crate::game::player::Controls;
    use crate::game::stage::{DestructibleKind, StageLayout};
    use crate::net::protocol::{EnemyState, PlayerStateData};
    use crate::net::transport::channel_pair;
    use crate::util::time::ManualClock;
    use parking_lot::Mutex;

    fn plan(frame: u64) -> FramePlan {
        FramePlan {
            frame,
            dt: 1.0 / 60.0,
            ai_dt: None,
            physics_dt: None,
            check_conditions: false,
            debug_snapshot: false,
            refresh_ui: false,
            cleanup: false,
            network_sync: false,
            render: false,
        }
    }

    fn state(role: NetRole, player_id: &str) -> MatchState {
        let settings = MatchSettings {
            role,
            player_id: player_id.to_string(),
            seed: 11,
            ..Default::default()
        };
        let mut state = MatchState::new(&settings);
        state.reset_game(0.0);
        state
    }

    fn from(sender: &str, msg: NetMsg) -> Vec<Envelope> {
        vec![Envelope::new(sender, msg)]
    }

    #[test]
    fn reset_loads_the_city_and_staggers_opening_spawns() {
        let mut s = state(NetRole::Offline, "solo");
        assert_eq!(s.world.walls.len(), 4);
        assert_eq!(s.world.destructibles.len(), 24);
        assert_eq!(s.world.players.len(), 1);

        // AI every frame with a plain step keeps the spawn timer short of its delay
        let ai = |frame| FramePlan {
            ai_dt: Some(1.0 / 60.0),
            ..plan(frame)
        };
        s.update(&ai(1), &FrameInput::default(), Vec::new(), 0.0);
        assert_eq!(s.world.enemies.len(), 1);

        // The other two markers come due 500 ms apart
        for frame in 2..62 {
            s.update(&ai(frame), &FrameInput::default(), Vec::new(), 0.0);
        }
        assert_eq!(s.world.enemies.len(), 3);
    }

    #[test]
    fn pause_freezes_the_simulation() {
        let mut s = state(NetRole::Offline, "solo");
        let pause = FrameInput {
            pause: true,
            ..Default::default()
        };
        s.update(&plan(1), &pause, Vec::new(), 0.0);
        assert_eq!(s.phase, MatchPhase::Paused);

        let before = s.world.sim_time_ms;
        for frame in 2..30 {
            s.update(&plan(frame), &FrameInput::default(), Vec::new(), 0.0);
        }
        assert_eq!(s.world.sim_time_ms, before);

        s.update(&plan(30), &pause, Vec::new(), 0.0);
        assert_eq!(s.phase, MatchPhase::Playing);
        s.update(&plan(31), &FrameInput::default(), Vec::new(), 0.0);
        assert!(s.world.sim_time_ms > before);
    }

    #[test]
    fn losing_every_player_ends_the_game_and_fire_restarts() {
        let mut s = state(NetRole::Offline, "solo");
        for p in s.world.players.values_mut() {
            p.score = 450;
            p.lives = 0;
            p.tank.body.alive = false;
        }
        let check = FramePlan {
            check_conditions: true,
            ..plan(30)
        };
        s.update(&check, &FrameInput::default(), Vec::new(), 0.0);
        assert_eq!(s.phase, MatchPhase::GameOver);
        assert_eq!(s.game_score, 450);

        let fire = FrameInput {
            fire: true,
            ..Default::default()
        };
        s.update(&plan(31), &fire, Vec::new(), 0.0);
        assert_eq!(s.phase, MatchPhase::Playing);
        assert!(s.world.players.values().all(|p| p.lives == 4 && p.alive()));
        assert_eq!(s.director.stage, 1);
    }

    #[test]
    fn clearing_a_stage_moves_to_the_island() {
        let mut s = state(NetRole::Offline, "solo");
        s.director.total_enemies_killed = 20;
        let check = FramePlan {
            check_conditions: true,
            ..plan(30)
        };
        s.update(&check, &FrameInput::default(), Vec::new(), 0.0);
        assert_eq!(s.director.stage, 2);
        assert_eq!(s.director.total_enemies_killed, 0);
        assert_eq!(s.director.spawn_delay_ms, 4000.0);
        assert_eq!(s.director.layout(), StageLayout::Island);
        assert!(s
            .world
            .destructibles
            .values()
            .all(|d| d.kind == DestructibleKind::Barrel));
    }

    #[test]
    fn debug_keys_drive_the_director() {
        let mut s = state(NetRole::Offline, "solo");
        let keys = |debug: DebugKeys| FrameInput {
            debug,
            ..Default::default()
        };

        s.update(&plan(1), &keys(DebugKeys { force_boss: true, ..Default::default() }), Vec::new(), 0.0);
        assert_eq!(s.director.total_enemies_killed, 16);

        s.update(&plan(2), &keys(DebugKeys { spawn_boss: true, ..Default::default() }), Vec::new(), 0.0);
        assert_eq!(s.world.census().flamethrowers, 1);

        s.update(&plan(3), &keys(DebugKeys { toggle_infinite_health: true, ..Default::default() }), Vec::new(), 0.0);
        assert!(s.world.players.values().all(|p| p.infinite_health));

        s.update(&plan(4), &keys(DebugKeys { next_stage: true, ..Default::default() }), Vec::new(), 0.0);
        assert_eq!(s.director.stage, 2);
        assert!(s.world.enemies.is_empty());

        s.update(&plan(5), &keys(DebugKeys { reset_stage: true, ..Default::default() }), Vec::new(), 0.0);
        assert_eq!(s.director.stage, 1);
    }

    #[test]
    fn peers_never_spawn_but_mirror_the_host() {
        let mut s = state(NetRole::Peer, "peer-1");
        for frame in 0..200 {
            s.update(&FramePlan { ai_dt: Some(0.05), ..plan(frame) }, &FrameInput::default(), Vec::new(), 0.0);
        }
        assert!(s.world.enemies.is_empty());

        let id = Uuid::new_v4();
        let spawned = NetMsg::EnemySpawned {
            enemy_id: id,
            enemy_type: EnemyType::Heavy,
            x: 150.0,
            y: 150.0,
        };
        s.update(&plan(1), &FrameInput::default(), from("host", spawned.clone()), 0.0);
        // Duplicates are ignored
        s.update(&plan(2), &FrameInput::default(), from("host", spawned), 0.0);
        assert_eq!(s.world.enemies.len(), 1);

        s.update(&plan(3), &FrameInput::default(), from("host", NetMsg::EnemyKilled { enemy_id: id }), 0.0);
        let cleanup = FramePlan {
            cleanup: true,
            ..plan(60)
        };
        s.update(&cleanup, &FrameInput::default(), Vec::new(), 0.0);
        assert!(s.world.enemies.is_empty());
        assert_eq!(s.director.total_enemies_killed, 1);
        // Peers report nothing about kills
        assert!(s
            .authority
            .drain_outbox()
            .iter()
            .all(|m| !matches!(m, NetMsg::EnemyKilled { .. })));
    }

    #[test]
    fn host_ignores_authority_claims_from_peers() {
        let mut s = state(NetRole::Host, "host");
        let handle = s.world.spawn_enemy(crate::game::director::SpawnOrder {
            enemy_type: EnemyType::Basic,
            position: Vector2D::new(150.0, 150.0),
        });
        let id = s.world.enemies.get(handle).map(|e| e.net_id).expect("enemy");

        s.update(&plan(1), &FrameInput::default(), from("peer-1", NetMsg::EnemyKilled { enemy_id: id }), 0.0);
        assert!(s.world.enemies.get(handle).is_some_and(|e| e.alive()));
    }

    #[test]
    fn network_bullets_skip_our_own_echo() {
        let mut s = state(NetRole::Host, "host");
        let shot = |player: &str| NetMsg::BulletFired {
            bullet_id: Uuid::new_v4(),
            player_id: player.to_string(),
            kind: BulletKind::Standard,
            x: 300.0,
            y: 300.0,
            dir_x: 0.0,
            dir_y: -1.0,
        };
        s.update(&plan(1), &FrameInput::default(), from("host", shot("host")), 0.0);
        assert!(s.world.bullets.is_empty());

        s.update(&plan(2), &FrameInput::default(), from("peer-1", shot("peer-1")), 0.0);
        let bullet = s.world.bullets.values().next().expect("mirrored bullet");
        assert!(bullet.owner.is_none());
        assert_eq!(bullet.network_origin.as_deref(), Some("peer-1"));
        assert_eq!(bullet.body.layer, crate::game::entity::CollisionLayer::PlayerBullet);
        // Mirrored shots are not re-broadcast
        assert!(s
            .authority
            .drain_outbox()
            .iter()
            .all(|m| !matches!(m, NetMsg::BulletFired { .. })));
    }

    #[test]
    fn host_sends_full_state_half_a_second_after_reset() {
        let mut s = state(NetRole::Host, "host");
        s.update(&plan(1), &FrameInput::default(), Vec::new(), 400.0);
        assert!(s
            .authority
            .drain_outbox()
            .iter()
            .all(|m| !matches!(m, NetMsg::FullGameState { .. })));

        s.update(&plan(2), &FrameInput::default(), Vec::new(), 600.0);
        let out = s.authority.drain_outbox();
        let full = out.iter().find_map(|m| match m {
            NetMsg::FullGameState { state } => Some(state),
            _ => None,
        });
        let full = full.expect("full sync sent");
        assert_eq!(full.stage, 1);
        assert_eq!(full.destructibles.len(), 24);
    }

    #[test]
    fn peer_adopts_the_host_baseline() {
        let mut s = state(NetRole::Peer, "peer-1");
        let stale = Uuid::new_v4();
        s.world
            .spawn_mirrored_enemy(stale, EnemyType::Basic, Vector2D::new(10.0, 10.0));

        let keep = Uuid::new_v4();
        let baseline = FullGameState {
            stage: 2,
            total_enemies_killed: 5,
            enemies_needed_to_win: 20,
            boss_battle_phase: false,
            enemies: vec![EnemyState {
                enemy_id: keep,
                enemy_type: EnemyType::Flame,
                x: 400.0,
                y: 150.0,
                health: 1,
                direction: 2,
            }],
            destructibles: vec![0, 1, 2],
            players: vec![(
                "host".to_string(),
                PlayerStateData {
                    x: 200.0,
                    y: 420.0,
                    alive: true,
                    ..Default::default()
                },
            )],
        };
        s.update(&plan(1), &FrameInput::default(), from("host", NetMsg::FullGameState { state: baseline }), 1_000.0);

        assert_eq!(s.director.stage, 2);
        assert_eq!(s.director.total_enemies_killed, 5);
        assert_eq!(s.world.destructibles.len(), 3);
        assert!(s.world.find_enemy(stale).is_none());
        let flame = s.world.find_enemy(keep).and_then(|h| s.world.enemies.get(h)).expect("mirrored");
        assert_eq!(flame.tank.body.health, 1);
        assert_eq!(flame.tank.facing, Direction::Down);
        assert_eq!(s.shadows.visible(1_500.0).len(), 1);
    }

    #[test]
    fn kill_pending_cleanup_at_baseline_is_counted_once_on_the_peer() {
        let mut host = state(NetRole::Host, "host");
        let handle = host.world.spawn_enemy(crate::game::director::SpawnOrder {
            enemy_type: EnemyType::Basic,
            position: Vector2D::new(150.0, 150.0),
        });
        let id = host.world.enemies.get(handle).map(|e| e.net_id).expect("enemy");
        host.world.apply_enemy_killed(id);
        let baseline = snapshot::full_game_state(&host.world, &host.director, "host");

        let cleanup = FramePlan {
            cleanup: true,
            ..plan(60)
        };
        host.update(&cleanup, &FrameInput::default(), Vec::new(), 0.0);
        assert_eq!(host.director.total_enemies_killed, 1);

        let mut peer = state(NetRole::Peer, "peer-1");
        let inbound = vec![
            Envelope::new("host", NetMsg::FullGameState { state: baseline }),
            Envelope::new("host", NetMsg::EnemyKilled { enemy_id: id }),
        ];
        peer.update(&plan(1), &FrameInput::default(), inbound, 0.0);
        peer.update(&cleanup, &FrameInput::default(), Vec::new(), 0.0);
        assert_eq!(peer.director.total_enemies_killed, 1);
        assert!(peer.world.enemies.is_empty());
    }

    #[test]
    fn remote_player_states_feed_shadows_but_not_our_own() {
        let mut s = state(NetRole::Host, "host");
        let update = |id: &str| NetMsg::PlayerState {
            player_id: id.to_string(),
            state: PlayerStateData {
                x: 1.0,
                y: 2.0,
                alive: true,
                ..Default::default()
            },
        };
        s.update(&plan(1), &FrameInput::default(), from("peer-1", update("peer-1")), 0.0);
        s.update(&plan(2), &FrameInput::default(), from("host", update("host-1")), 0.0);
        assert_eq!(s.shadows.len(), 1);
        assert!(s.shadows.get("peer-1").is_some());
    }

    #[derive(Clone)]
    struct SharedRenderer(Arc<Mutex<HeadlessRenderer<AssetCatalog>>>, Vector2D);

    impl RenderSink for SharedRenderer {
        fn add_entity(&mut self, entity: EntityRef, sprite: &str) {
            self.0.lock().add_entity(entity, sprite);
        }
        fn remove_entity(&mut self, entity: EntityRef) {
            self.0.lock().remove_entity(entity);
        }
        fn camera_mut(&mut self) -> &mut Vector2D {
            &mut self.1
        }
        fn set_background(&mut self, name: &str) {
            self.0.lock().set_background(name);
        }
        fn render(&mut self, scene: &Scene) -> Result<(), CollabError> {
            self.0.lock().render(scene)
        }
    }

    struct BrokenRenderer {
        calls: u32,
        camera: Vector2D,
    }

    impl RenderSink for BrokenRenderer {
        fn add_entity(&mut self, _entity: EntityRef, _sprite: &str) {}
        fn remove_entity(&mut self, _entity: EntityRef) {}
        fn camera_mut(&mut self) -> &mut Vector2D {
            &mut self.camera
        }
        fn set_background(&mut self, _name: &str) {}
        fn render(&mut self, _scene: &Scene) -> Result<(), CollabError> {
            self.calls += 1;
            match self.calls {
                1 => Err(CollabError::Render("device lost".to_string())),
                2 => panic!("renderer exploded"),
                _ => Ok(()),
            }
        }
    }

    fn game(
        settings: MatchSettings,
        input: ScriptedInput,
        renderer: Box<dyn RenderSink>,
    ) -> (GameMatch, MatchHandle, ManualClock) {
        let clock = ManualClock::new(10.0);
        let collab = Collaborators {
            input: Box::new(input),
            renderer,
            audio: Box::new(LogAudio::default()),
        };
        let (game, handle) = GameMatch::new(settings, collab, Arc::new(clock.clone()));
        (game, handle, clock)
    }

    fn run_frames(game: &mut GameMatch, clock: &ManualClock, frames: usize) {
        for _ in 0..frames {
            clock.advance(1.0 / 60.0);
            game.frame();
        }
    }

    #[test]
    fn frames_render_and_publish_hud() {
        let renderer = SharedRenderer(
            Arc::new(Mutex::new(HeadlessRenderer::new(AssetCatalog::with_defaults()))),
            Vector2D::ZERO,
        );
        let (mut game, handle, clock) = game(
            MatchSettings::default(),
            ScriptedInput::new(),
            Box::new(renderer.clone()),
        );
        let mut hud = handle.subscribe();
        game.start();

        // First call only primes the clock
        assert!(game.frame().is_none());
        run_frames(&mut game, &clock, 120);

        assert_eq!(game.frame_count(), 120);
        assert_eq!(game.failed_frames(), 0);
        let r = renderer.0.lock();
        assert_eq!(r.frames_rendered, 120);
        assert!(r.tracked() > 20);
        let first = hud.try_recv().expect("hud published");
        assert_eq!(first.stage, 1);
        assert_eq!(first.lives, vec![4]);
    }

    #[test]
    fn failed_frames_do_not_stop_the_loop() {
        let (mut game, _handle, clock) = game(
            MatchSettings::default(),
            ScriptedInput::new(),
            Box::new(BrokenRenderer {
                calls: 0,
                camera: Vector2D::ZERO,
            }),
        );
        game.start();
        game.frame();
        run_frames(&mut game, &clock, 5);

        assert_eq!(game.frame_count(), 5);
        assert_eq!(game.failed_frames(), 2);
        assert!(game.state.world.sim_time_ms > 60.0);
    }

    #[test]
    fn held_fire_shoots_through_the_driver() {
        let mut input = ScriptedInput::new();
        input.hold(
            0,
            Controls {
                fire: true,
                ..Default::default()
            },
        );
        let renderer = HeadlessRenderer::new(AssetCatalog::with_defaults());
        let (mut game, _handle, clock) = game(MatchSettings::default(), input, Box::new(renderer));
        game.start();
        game.frame();
        run_frames(&mut game, &clock, 2);
        assert_eq!(
            game.state
                .world
                .bullets
                .values()
                .filter(|b| b.owner.is_some_and(|o| o.side() == crate::game::combat::Side::Player))
                .count(),
            1
        );
    }

    #[test]
    fn run_returns_a_summary_once_stopped() {
        let (game, handle, _clock) = game(
            MatchSettings::default(),
            ScriptedInput::new(),
            Box::new(HeadlessRenderer::new(AssetCatalog::with_defaults())),
        );
        handle.stop();
        let summary = tokio_test::block_on(game.run());
        assert_eq!(summary.phase, MatchPhase::Playing);
        assert_eq!(summary.stage, 1);
        assert_eq!(summary.failed_frames, 0);
    }

    #[test]
    fn host_traffic_reaches_the_peer_inbox() {
        let ((host_transport, _host_rx), (_peer_transport, mut peer_rx)) = channel_pair();
        let settings = MatchSettings {
            role: NetRole::Host,
            ..Default::default()
        };
        let (host, _handle, clock) = game(
            settings,
            ScriptedInput::new(),
            Box::new(HeadlessRenderer::new(AssetCatalog::with_defaults())),
        );
        let mut host = host.with_network(Box::new(host_transport), Inbox::new());
        host.start();
        host.frame();
        // Long enough for the full sync and the first marker spawn
        run_frames(&mut host, &clock, 60);

        let peer_inbox = Inbox::new();
        while let Ok(raw) = peer_rx.try_recv() {
            peer_inbox.push(Envelope::decode(&raw).expect("valid json"));
        }
        let batch = peer_inbox.drain();
        assert!(batch.iter().all(|e| e.from == "host"));
        assert!(batch
            .iter()
            .any(|e| matches!(e.msg, NetMsg::FullGameState { .. })));
        assert!(batch
            .iter()
            .any(|e| matches!(e.msg, NetMsg::EnemySpawned { .. })));
        assert!(batch
            .iter()
            .any(|e| matches!(e.msg, NetMsg::PlayerState { .. })));

        let mut peer = state(NetRole::Peer, "peer-1");
        peer.update(&plan(1), &FrameInput::default(), batch, clock.now_secs() * 1000.0);
        assert!(!peer.world.enemies.is_empty());
        assert_eq!(peer.shadows.len(), 1);
    }
}
