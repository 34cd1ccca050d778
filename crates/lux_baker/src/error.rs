//! Bake errors.

use lux_core::BufferError;
use thiserror::Error;

/// Errors that can occur during lightmap and environment updates.
///
/// The collider and solver are left untouched by a failed update.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BakeError {
    #[error("No static object with index {index} ({count} registered)")]
    InvalidObject { index: usize, count: usize },

    #[error("Object {object} has no lightmap mapping")]
    MissingMapping { object: usize },

    #[error("Vertex buffer has {got} slots, object {object} has {expected} vertices")]
    VertexCountMismatch { object: usize, expected: usize, got: usize },

    #[error("Environment maps need a texel buffer")]
    UnsupportedTarget,

    #[error("Out of memory allocating {what}")]
    OutOfMemory { what: &'static str },

    #[error("Update aborted")]
    Aborted,

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

pub type BakeResult<T> = Result<T, BakeError>;
