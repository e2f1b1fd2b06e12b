//! Game simulation modules

pub mod arena;
pub mod bullet;
pub mod collision;
pub mod combat;
pub mod director;
pub mod enemy;
pub mod entity;
pub mod r#match;
pub mod physics;
pub mod player;
pub mod scheduler;
pub mod snapshot;
pub mod stage;
pub mod tank;
pub mod vector;
pub mod world;

pub use r#match::{Collaborators, GameMatch, MatchHandle, MatchSettings, MatchSummary};

use crate::collab::CollabError;
use crate::net::NetError;

/// Per-frame faults; the frame boundary logs these and keeps going
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("{phase} phase panicked: {message}")]
    Panicked { phase: &'static str, message: String },

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Collaborator error: {0}")]
    Collab(#[from] CollabError),
}
