use thiserror::Error;

use crate::physics::{ActorHandle, MeshHandle};

pub type Result<T> = std::result::Result<T, TerrainError>;

#[derive(Debug, Error)]
pub enum TerrainError {
    /// The physics backend rejected the collision mesh. Fatal for a terrain.
    #[error("failed to cook terrain collision mesh: {0}")]
    Cooking(String),

    #[error("{buffer} buffer holds {actual} bytes, expected {expected}")]
    BufferSize {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown physics actor {0:?}")]
    UnknownActor(ActorHandle),

    #[error("unknown collision mesh {0:?}")]
    UnknownMesh(MeshHandle),
}
