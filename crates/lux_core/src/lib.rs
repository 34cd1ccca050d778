//! Lux Core - scene inputs for lighting precomputation.
//!
//! This crate provides the contracts every other Lux crate consumes:
//!
//! - **Geometry**: the `MeshAdapter` trait, a plain `Mesh`, and composable
//!   wrappers (`TransformWrapper`, `MultiMeshWrapper`, `DedupVerticesWrapper`)
//! - **Materials**: per-triangle `Material` records in a `MaterialTable`
//! - **Lights**: directional, point and spot `Light`s with distance falloff
//! - **Outputs**: the `OutputBuffer` contract for lightmaps and vertex colors
//! - **Environment**: sky radiance looked up by direction
//!
//! # Example
//!
//! ```ignore
//! use lux_core::{Mesh, MaterialTable, Material};
//!
//! let mesh = Mesh::new(positions, indices, None);
//! let materials = MaterialTable::uniform(mesh.triangle_count(), Material::diffuse("grey", Color::splat(0.5)));
//! ```

pub mod buffer;
pub mod environment;
pub mod light;
pub mod material;
pub mod mesh;
pub mod scaler;
pub mod wrappers;

// Re-export commonly used types
pub use buffer::{BufferError, BufferLayout, LightmapBuffer, OutputBuffer, VertexBuffer};
pub use environment::{Environment, EnvironmentError, LatLongEnvironment, UniformEnvironment};
pub use light::{DistanceFalloff, Light, LightKind};
pub use material::{Color, Material, MaterialTable, SideBits};
pub use mesh::{Mesh, MeshAdapter};
pub use scaler::{GammaScaler, Scaler};
pub use wrappers::{DedupVerticesWrapper, MultiMeshWrapper, TransformWrapper};
