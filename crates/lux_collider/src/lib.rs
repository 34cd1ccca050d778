//! Lux Collider - ray/triangle queries over a `MeshAdapter`.
//!
//! Builds a BSP tree over the mesh triangles and answers nearest-hit
//! queries. Candidate hits are offered to a `CollisionHandler` in
//! near-to-far order, so handlers can skip triangles or accumulate partial
//! visibility before the first accepted hit ends the query.

mod bsp;
mod collider;
mod handler;
mod ray;
mod triangle;

pub use collider::{Collider, ColliderStats, Technique};
pub use handler::{AcceptAll, CollisionHandler, SkipTriangle, TransmittanceHandler};
pub use ray::{CollisionRay, Hit, RayFlags};

/// Re-export the math types that appear in the public API
pub use lux_math::{Interval, Plane, Ray, Vec2, Vec3};
