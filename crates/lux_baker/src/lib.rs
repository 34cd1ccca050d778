//! Lux Baker - lightmaps and vertex colors from a lit static scene.
//!
//! - **Rasterization**: `subtexel` splits triangles into exact per-texel pieces
//! - **Gathering**: `GatherContext` samples lights, the current radiosity
//!   solution and the environment at each piece, in parallel with rayon
//! - **Filtering**: normalization, hole filling and background fill
//! - **Facade**: `DynamicSolver` owns the scene and tracks what changed
//!
//! # Example
//!
//! ```ignore
//! let mut solver = DynamicSolver::default();
//! solver.set_static_objects(objects, SmoothingParameters::default(), Technique::BspFast);
//! solver.set_lights(lights);
//! while solver.calculate(|| start.elapsed() > budget) == Improvement::Improved {}
//! let mut lightmap = LightmapBuffer::new(256, 256)?;
//! solver.update_lightmap(0, &mut [&mut lightmap], &UpdateParameters::default(), &FilteringParameters::default())?;
//! ```

mod error;
pub mod facade;
pub mod filter;
pub mod gather;
pub mod interpolator;
mod params;
pub mod subtexel;

pub use error::{BakeError, BakeResult};
pub use facade::{DynamicSolver, StaticObject};
pub use filter::Texel;
pub use gather::{GatherContext, Gathered};
pub use interpolator::{Interpolator, InterpolatorCache};
pub use params::{FilteringParameters, OutputQuantity, UpdateParameters};
pub use subtexel::SubTexel;
