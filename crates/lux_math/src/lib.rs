// Re-export glam for convenience
pub use glam::*;

// Lux math types
mod aabb;
mod interval;
mod plane;
mod ray;
pub mod sequence;
mod transform;

pub use aabb::Aabb;
pub use interval::Interval;
pub use plane::{Plane, Side};
pub use ray::Ray;
pub use transform::Mat4Ext;

/// Orthonormal tangent frame around a unit normal.
///
/// Returns `(tangent, bitangent)` such that `(tangent, bitangent, normal)` is
/// right-handed. Uses the branchless construction of Duff et al.
pub fn orthonormal_basis(normal: Vec3) -> (Vec3, Vec3) {
    let sign = 1.0_f32.copysign(normal.z);
    let a = -1.0 / (sign + normal.z);
    let b = normal.x * normal.y * a;
    let tangent = Vec3::new(1.0 + sign * normal.x * normal.x * a, sign * b, -sign * normal.x);
    let bitangent = Vec3::new(b, sign + normal.y * normal.y * a, -normal.y);
    (tangent, bitangent)
}
