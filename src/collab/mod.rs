//! Collaborator seams: input, rendering, audio and asset lookup
//!
//! The simulation talks to the outside world only through these traits.
//! Headless implementations back the binary and the tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::game::entity::EntityRef;
use crate::game::player::Controls;
use crate::game::snapshot::Scene;
use crate::game::vector::Vector2D;

/// Collaborator failures surfaced to the frame boundary
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("Render failed: {0}")]
    Render(String),

    #[error("Entity {0:?} was never added to the renderer")]
    UnknownEntity(EntityRef),
}

pub const KEY_NEXT_STAGE: &str = "KeyN";
pub const KEY_SPAWN_BOSS: &str = "KeyB";
pub const KEY_RESET_STAGE: &str = "KeyR";
pub const KEY_FORCE_BOSS: &str = "KeyO";
pub const KEY_INFINITE_HEALTH: &str = "KeyH";
pub const PAUSE_KEYS: [&str; 2] = ["Escape", "KeyP"];

/// Keyboard/gamepad state, queried per local player
pub trait InputSource: Send {
    fn is_up_pressed(&self, player: usize) -> bool;
    fn is_down_pressed(&self, player: usize) -> bool;
    fn is_left_pressed(&self, player: usize) -> bool;
    fn is_right_pressed(&self, player: usize) -> bool;
    fn is_fire_pressed(&self, player: usize) -> bool;
    /// Edge-triggered pause toggle
    fn is_pause_pressed(&self) -> bool;
    /// True if any of `codes` went down since the last frame
    fn is_key_just_pressed(&self, codes: &[&str]) -> bool;
    /// End-of-frame hook so edge detection sees the next frame fresh
    fn update_previous_keys(&mut self);

    /// Start-of-frame hook for sources that generate their own state
    fn poll(&mut self, _now_ms: f64) {}

    fn controls(&self, player: usize) -> Controls {
        Controls {
            up: self.is_up_pressed(player),
            down: self.is_down_pressed(player),
            left: self.is_left_pressed(player),
            right: self.is_right_pressed(player),
            fire: self.is_fire_pressed(player),
        }
    }
}

/// Debug hooks requested this frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugKeys {
    pub next_stage: bool,
    pub spawn_boss: bool,
    pub reset_stage: bool,
    pub force_boss: bool,
    pub toggle_infinite_health: bool,
}

/// Everything the simulation reads from input in one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    /// Indexed by local player
    pub controls: Vec<Controls>,
    pub pause: bool,
    /// Any local player holding fire
    pub fire: bool,
    pub debug: DebugKeys,
}

impl FrameInput {
    pub fn read(source: &dyn InputSource, players: usize) -> Self {
        let controls: Vec<Controls> = (0..players).map(|i| source.controls(i)).collect();
        let fire = controls.iter().any(|c| c.fire);
        Self {
            controls,
            pause: source.is_pause_pressed(),
            fire,
            debug: DebugKeys {
                next_stage: source.is_key_just_pressed(&[KEY_NEXT_STAGE]),
                spawn_boss: source.is_key_just_pressed(&[KEY_SPAWN_BOSS]),
                reset_stage: source.is_key_just_pressed(&[KEY_RESET_STAGE]),
                force_boss: source.is_key_just_pressed(&[KEY_FORCE_BOSS]),
                toggle_infinite_health: source.is_key_just_pressed(&[KEY_INFINITE_HEALTH]),
            },
        }
    }
}

/// Input driven by code: held controls per player plus a key set
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    held: HashMap<usize, Controls>,
    keys: HashSet<String>,
    previous: HashSet<String>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&mut self, player: usize, controls: Controls) {
        self.held.insert(player, controls);
    }

    pub fn press(&mut self, code: &str) {
        self.keys.insert(code.to_string());
    }

    pub fn release(&mut self, code: &str) {
        self.keys.remove(code);
    }

    fn held(&self, player: usize) -> Controls {
        self.held.get(&player).copied().unwrap_or_default()
    }
}

impl InputSource for ScriptedInput {
    fn is_up_pressed(&self, player: usize) -> bool {
        self.held(player).up
    }

    fn is_down_pressed(&self, player: usize) -> bool {
        self.held(player).down
    }

    fn is_left_pressed(&self, player: usize) -> bool {
        self.held(player).left
    }

    fn is_right_pressed(&self, player: usize) -> bool {
        self.held(player).right
    }

    fn is_fire_pressed(&self, player: usize) -> bool {
        self.held(player).fire
    }

    fn is_pause_pressed(&self) -> bool {
        self.is_key_just_pressed(&PAUSE_KEYS)
    }

    fn is_key_just_pressed(&self, codes: &[&str]) -> bool {
        codes
            .iter()
            .any(|c| self.keys.contains(*c) && !self.previous.contains(*c))
    }

    fn update_previous_keys(&mut self) {
        self.previous = self.keys.clone();
    }
}

/// Bot input for headless runs: wanders and keeps the trigger held
#[derive(Debug, Clone)]
pub struct AutoPilot {
    rng: ChaCha8Rng,
    headings: Vec<Controls>,
    next_turn_ms: f64,
}

impl AutoPilot {
    const TURN_EVERY_MS: f64 = 900.0;

    pub fn new(seed: u64, players: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            headings: vec![Controls::default(); players],
            next_turn_ms: 0.0,
        }
    }

    fn heading(&self, player: usize) -> Controls {
        self.headings.get(player).copied().unwrap_or_default()
    }
}

impl InputSource for AutoPilot {
    fn is_up_pressed(&self, player: usize) -> bool {
        self.heading(player).up
    }

    fn is_down_pressed(&self, player: usize) -> bool {
        self.heading(player).down
    }

    fn is_left_pressed(&self, player: usize) -> bool {
        self.heading(player).left
    }

    fn is_right_pressed(&self, player: usize) -> bool {
        self.heading(player).right
    }

    fn is_fire_pressed(&self, _player: usize) -> bool {
        true
    }

    fn is_pause_pressed(&self) -> bool {
        false
    }

    fn is_key_just_pressed(&self, _codes: &[&str]) -> bool {
        false
    }

    fn update_previous_keys(&mut self) {}

    fn poll(&mut self, now_ms: f64) {
        if now_ms < self.next_turn_ms {
            return;
        }
        self.next_turn_ms = now_ms + Self::TURN_EVERY_MS;
        for heading in self.headings.iter_mut() {
            let mut controls = Controls {
                fire: true,
                ..Default::default()
            };
            match self.rng.gen_range(0..5) {
                0 => controls.up = true,
                1 => controls.down = true,
                2 => controls.left = true,
                3 => controls.right = true,
                _ => {}
            }
            *heading = controls;
        }
    }
}

/// Opaque image reference handed out by an asset resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u32);

impl ImageHandle {
    /// Substitute for anything the resolver does not know
    pub const PLACEHOLDER: ImageHandle = ImageHandle(0);
}

pub trait AssetResolver: Send {
    fn get_image(&self, name: &str) -> Option<ImageHandle>;
}

const KNOWN_IMAGES: [&str; 19] = [
    "player1",
    "player2",
    "player3",
    "enemy1",
    "enemy2",
    "enemy3",
    "enemy4",
    "bullet",
    "missile",
    "fireball",
    "flame",
    "car",
    "barrel",
    "powerup",
    "explosion",
    "impact",
    "stage_city",
    "stage_island",
    "gamename",
];

/// In-memory name -> handle table
#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    images: HashMap<String, ImageHandle>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with every sprite the game asks for
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        for name in KNOWN_IMAGES {
            catalog.register(name);
        }
        catalog
    }

    pub fn register(&mut self, name: &str) -> ImageHandle {
        let next = ImageHandle(self.images.len() as u32 + 1);
        *self.images.entry(name.to_string()).or_insert(next)
    }
}

impl AssetResolver for AssetCatalog {
    fn get_image(&self, name: &str) -> Option<ImageHandle> {
        self.images.get(name).copied()
    }
}

/// Receives entity membership and per-frame scenes; never asked for pixels
pub trait RenderSink: Send {
    fn add_entity(&mut self, entity: EntityRef, sprite: &str);
    fn remove_entity(&mut self, entity: EntityRef);
    fn camera_mut(&mut self) -> &mut Vector2D;
    fn set_background(&mut self, name: &str);
    fn render(&mut self, scene: &Scene) -> Result<(), CollabError>;
}

/// Tracks what a real renderer would draw and resolves sprites with a
/// placeholder fallback
pub struct HeadlessRenderer<A: AssetResolver> {
    assets: A,
    entities: BTreeMap<EntityRef, ImageHandle>,
    camera: Vector2D,
    background: Option<ImageHandle>,
    pub frames_rendered: u64,
    pub last_drawn: usize,
}

impl<A: AssetResolver> HeadlessRenderer<A> {
    pub fn new(assets: A) -> Self {
        Self {
            assets,
            entities: BTreeMap::new(),
            camera: Vector2D::ZERO,
            background: None,
            frames_rendered: 0,
            last_drawn: 0,
        }
    }

    fn resolve(&self, name: &str) -> ImageHandle {
        self.assets.get_image(name).unwrap_or_else(|| {
            debug!(asset = name, "Missing image, using placeholder");
            ImageHandle::PLACEHOLDER
        })
    }

    pub fn tracked(&self) -> usize {
        self.entities.len()
    }

    pub fn image_of(&self, entity: EntityRef) -> Option<ImageHandle> {
        self.entities.get(&entity).copied()
    }
}

impl<A: AssetResolver> RenderSink for HeadlessRenderer<A> {
    fn add_entity(&mut self, entity: EntityRef, sprite: &str) {
        let image = self.resolve(sprite);
        self.entities.insert(entity, image);
    }

    fn remove_entity(&mut self, entity: EntityRef) {
        self.entities.remove(&entity);
    }

    fn camera_mut(&mut self) -> &mut Vector2D {
        &mut self.camera
    }

    fn set_background(&mut self, name: &str) {
        self.background = Some(self.resolve(name));
    }

    fn render(&mut self, scene: &Scene) -> Result<(), CollabError> {
        for sprite in &scene.sprites {
            if !self.entities.contains_key(&sprite.entity) {
                return Err(CollabError::UnknownEntity(sprite.entity));
            }
        }
        self.last_drawn = scene.sprites.iter().filter(|s| s.visible).count()
            + scene.shadows.len()
            + scene.effects.len();
        self.frames_rendered += 1;
        trace!(drawn = self.last_drawn, "Frame rendered");
        Ok(())
    }
}

/// Fire-and-forget audio; failures stay inside the implementation
pub trait AudioSink: Send {
    fn play_sound(&mut self, name: &str, volume: f64);
    fn play_music(&mut self, name: &str, volume: f64, looped: bool);
    fn stop_music(&mut self);
    fn set_music_volume(&mut self, volume: f64);
    fn set_sfx_volume(&mut self, volume: f64);
}

/// Audio sink that only logs and counts
#[derive(Debug, Clone)]
pub struct LogAudio {
    pub music: Option<String>,
    pub music_volume: f64,
    pub sfx_volume: f64,
    pub sounds_played: u64,
}

impl Default for LogAudio {
    fn default() -> Self {
        Self {
            music: None,
            music_volume: 1.0,
            sfx_volume: 1.0,
            sounds_played: 0,
        }
    }
}

impl AudioSink for LogAudio {
    fn play_sound(&mut self, name: &str, volume: f64) {
        self.sounds_played += 1;
        trace!(sound = name, volume = volume * self.sfx_volume, "Play sound");
    }

    fn play_music(&mut self, name: &str, volume: f64, looped: bool) {
        debug!(track = name, volume, looped, "Play music");
        self.music = Some(name.to_string());
        self.music_volume = volume;
    }

    fn stop_music(&mut self) {
        if let Some(track) = self.music.take() {
            debug!(track = %track, "Stop music");
        }
    }

    fn set_music_volume(&mut self, volume: f64) {
        self.music_volume = volume.clamp(0.0, 1.0);
    }

    fn set_sfx_volume(&mut self, volume: f64) {
        self.sfx_volume = volume.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::arena::Arena;

    #[test]
    fn just_pressed_is_edge_triggered() {
        let mut input = ScriptedInput::new();
        input.press(KEY_NEXT_STAGE);
        assert!(input.is_key_just_pressed(&[KEY_NEXT_STAGE]));
        input.update_previous_keys();
        assert!(!input.is_key_just_pressed(&[KEY_NEXT_STAGE]));
        input.release(KEY_NEXT_STAGE);
        input.update_previous_keys();
        input.press(KEY_NEXT_STAGE);
        assert!(input.is_key_just_pressed(&["KeyX", KEY_NEXT_STAGE]));
    }

    #[test]
    fn frame_input_collects_controls_and_hooks() {
        let mut input = ScriptedInput::new();
        input.hold(
            1,
            Controls {
                fire: true,
                left: true,
                ..Default::default()
            },
        );
        input.press("KeyP");
        input.press(KEY_FORCE_BOSS);

        let frame = FrameInput::read(&input, 2);
        assert_eq!(frame.controls.len(), 2);
        assert!(frame.controls[1].left);
        assert!(frame.fire);
        assert!(frame.pause);
        assert!(frame.debug.force_boss);
        assert!(!frame.debug.next_stage);
    }

    #[test]
    fn autopilot_always_fires_and_turns_on_schedule() {
        let mut pilot = AutoPilot::new(5, 2);
        pilot.poll(0.0);
        assert!(pilot.is_fire_pressed(0));
        let first = pilot.controls(1);
        pilot.poll(100.0);
        assert_eq!(pilot.controls(1), first);
        assert!(!pilot.is_pause_pressed());
    }

    #[test]
    fn missing_images_resolve_to_placeholder() {
        let mut renderer = HeadlessRenderer::new(AssetCatalog::with_defaults());
        let mut arena = Arena::new();
        let known = EntityRef::Bullet(arena.insert(()));
        let unknown = EntityRef::Bullet(arena.insert(()));
        renderer.add_entity(known, "missile");
        renderer.add_entity(unknown, "no_such_sprite");
        assert_ne!(renderer.image_of(known), Some(ImageHandle::PLACEHOLDER));
        assert_eq!(renderer.image_of(unknown), Some(ImageHandle::PLACEHOLDER));
        renderer.remove_entity(known);
        assert_eq!(renderer.tracked(), 1);
    }

    #[test]
    fn log_audio_clamps_volumes() {
        let mut audio = LogAudio::default();
        audio.play_music("music_stage", 0.3, true);
        audio.set_sfx_volume(4.0);
        audio.play_sound("shoot", 0.3);
        assert_eq!(audio.sfx_volume, 1.0);
        assert_eq!(audio.sounds_played, 1);
        audio.stop_music();
        assert!(audio.music.is_none());
    }
}
