//! Box physics: push-out separation and arena bounds

use super::entity::Entity;
use super::vector::Vector2D;

/// Playfield size in pixels
pub const ARENA_WIDTH: f64 = 800.0;
pub const ARENA_HEIGHT: f64 = 600.0;

/// Physics helpers for axis-aligned bodies
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Smallest translation that moves `mover` out of `obstacle`.
    ///
    /// Pushes along the axis with the shallower penetration, away from the
    /// obstacle's center. Zero when they do not overlap.
    pub fn push_out(mover: &Entity, obstacle: &Entity) -> Vector2D {
        if !mover.intersects(obstacle) {
            return Vector2D::ZERO;
        }

        let delta = mover.center() - obstacle.center();
        let dx = if delta.x < 0.0 {
            obstacle.position.x - (mover.position.x + mover.size.x)
        } else {
            obstacle.position.x + obstacle.size.x - mover.position.x
        };
        let dy = if delta.y < 0.0 {
            obstacle.position.y - (mover.position.y + mover.size.y)
        } else {
            obstacle.position.y + obstacle.size.y - mover.position.y
        };

        if dx.abs() < dy.abs() {
            Vector2D::new(dx, 0.0)
        } else {
            Vector2D::new(0.0, dy)
        }
    }

    /// Move `mover` fully out of a static obstacle
    pub fn separate(mover: &mut Entity, obstacle: &Entity) {
        let push = Self::push_out(mover, obstacle);
        mover.position = mover.position + push;
    }

    /// Move `mover` half way out; the other body resolves its own half
    pub fn separate_halfway(mover: &mut Entity, other: &Entity) {
        let push = Self::push_out(mover, other);
        mover.position = mover.position + push * 0.5;
    }

    pub fn clamp_to_arena(body: &mut Entity) {
        body.clamp_to(ARENA_WIDTH, ARENA_HEIGHT);
    }

    pub fn is_off_arena(body: &Entity) -> bool {
        body.is_outside(ARENA_WIDTH, ARENA_HEIGHT)
    }
}
