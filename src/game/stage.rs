//! Stage layouts: boundary walls, destructible props, enemy spawn points

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::entity::{CollisionLayer, Entity, LayerMask};
use super::vector::Vector2D;

const WALL_THICKNESS: f64 = 8.0;
/// Prop box around each layout coordinate
const PROP_SIZE: (f64, f64) = (28.0, 22.0);

/// Predetermined enemy entry points, drained in order
pub const SPAWN_MARKERS: [(f64, f64); 5] = [
    (150.0, 150.0),
    (400.0, 150.0),
    (600.0, 150.0),
    (150.0, 300.0),
    (600.0, 300.0),
];
/// Markers spawned immediately (staggered) when a stage starts
pub const INITIAL_MARKER_SPAWNS: usize = 3;
pub const MARKER_STAGGER_MS: f64 = 500.0;

/// Uniform fallback once the markers are used up
pub const RANDOM_SPAWN_POOL: [(f64, f64); 8] = [
    (150.0, 150.0),
    (300.0, 150.0),
    (450.0, 150.0),
    (600.0, 150.0),
    (150.0, 450.0),
    (600.0, 450.0),
    (150.0, 300.0),
    (600.0, 300.0),
];

/// Prop centers: four columns of six
const PROP_CENTERS: [(f64, f64); 24] = [
    (226.0, 177.0),
    (226.0, 226.0),
    (226.0, 275.0),
    (226.0, 324.0),
    (226.0, 375.0),
    (225.0, 424.0),
    (358.0, 177.0),
    (358.0, 226.0),
    (358.0, 275.0),
    (358.0, 324.0),
    (358.0, 375.0),
    (358.0, 424.0),
    (494.0, 177.0),
    (494.0, 226.0),
    (494.0, 275.0),
    (494.0, 324.0),
    (494.0, 375.0),
    (490.0, 424.0),
    (623.0, 177.0),
    (623.0, 226.0),
    (623.0, 275.0),
    (623.0, 324.0),
    (623.0, 375.0),
    (623.0, 424.0),
];

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("No layout for stage {0}")]
    Unknown(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructibleKind {
    Car,
    Barrel,
}

impl DestructibleKind {
    pub fn health(self) -> i32 {
        match self {
            DestructibleKind::Car => 2,
            DestructibleKind::Barrel => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DestructibleKind::Car => "car",
            DestructibleKind::Barrel => "barrel",
        }
    }
}

/// Prop that soaks up bullets and blocks tanks until destroyed
#[derive(Debug, Clone)]
pub struct Destructible {
    pub body: Entity,
    /// Layout index, identical on every participant
    pub id: u32,
    pub kind: DestructibleKind,
}

impl Destructible {
    pub fn new(id: u32, kind: DestructibleKind, center: Vector2D) -> Self {
        let (w, h) = PROP_SIZE;
        let mut body = Entity::new(center.x - w / 2.0, center.y - h / 2.0, w, h)
            .with_layer(CollisionLayer::Destructible, LayerMask::NONE)
            .with_health(kind.health());
        body.apply_friction = false;
        Self { body, id, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageLayout {
    City,
    Island,
}

impl StageLayout {
    pub fn for_stage(stage: u32) -> Result<Self, StageError> {
        match stage {
            1 => Ok(StageLayout::City),
            2 => Ok(StageLayout::Island),
            n => Err(StageError::Unknown(n)),
        }
    }

    /// Layout for `stage`, falling back to the city for unknown stages
    pub fn resolve(stage: u32) -> Self {
        Self::for_stage(stage).unwrap_or_else(|e| {
            warn!(stage, error = %e, "Falling back to city layout");
            StageLayout::City
        })
    }

    pub fn background(self) -> &'static str {
        match self {
            StageLayout::City => "stage_city",
            StageLayout::Island => "stage_island",
        }
    }

    /// Invisible boundary walls
    pub fn walls(self) -> Vec<Entity> {
        let t = WALL_THICKNESS;
        let rects = match self {
            StageLayout::City => [
                (110.0, 102.0 - t / 2.0, 579.0, t),
                (689.0 - t / 2.0, 100.0, t, 400.0),
                (100.0, 500.0 - t / 2.0, 590.0, t),
                (100.0 - t / 2.0, 102.0, t, 398.0),
            ],
            StageLayout::Island => [
                (110.0, 94.0, 579.0, t),
                (689.0, 100.0, t, 400.0),
                (100.0, 500.0, 589.0, t),
                (100.0, 102.0, t, 398.0),
            ],
        };

        rects
            .iter()
            .map(|&(x, y, w, h)| {
                let mut wall =
                    Entity::new(x, y, w, h).with_layer(CollisionLayer::Wall, LayerMask::NONE);
                wall.visible = false;
                wall.apply_friction = false;
                wall
            })
            .collect()
    }

    pub fn destructibles(self) -> Vec<Destructible> {
        let kind = match self {
            StageLayout::City => DestructibleKind::Car,
            StageLayout::Island => DestructibleKind::Barrel,
        };
        PROP_CENTERS
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Destructible::new(i as u32, kind, Vector2D::new(x, y)))
            .collect()
    }
}
