//! Lux Solver - progressive refinement radiosity on a static scene.
//!
//! The `StaticSolver` imports a mesh through a `Collider`, subdivides its
//! triangles where primary illumination varies, and propagates energy by
//! shooting rays from the patch holding the most un-shot power. Results are
//! read back per triangle, per corner, per point or per leaf patch through
//! a `Measure`.
//!
//! # Example
//!
//! ```ignore
//! let mut solver = StaticSolver::new(collider, materials, SmoothingParameters::default(), PropagationParameters::default());
//! solver.illumination_reset(true, true);
//! while solver.illumination_improve(|| start.elapsed() > budget) == Improvement::Improved {}
//! let irradiance = solver.triangle_measure(0, None, Measure::IRRADIANCE, None);
//! ```

mod ivertex;
mod measure;
mod params;
mod patch;
mod solver;

pub use measure::{Measure, SubtriangleMeasure};
pub use params::{PropagationParameters, SmoothingParameters};
pub use solver::{Improvement, SolverState, StaticSolver};
