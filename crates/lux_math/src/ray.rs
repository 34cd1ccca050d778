use crate::Vec3;

/// A ray in 3D space with origin, direction and precomputed reciprocal direction.
///
/// The reciprocal direction lets slab and plane tests multiply instead of
/// divide in the innermost traversal loop. Zero direction components map to
/// signed infinities, which the slab test handles.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a new ray. `direction` should be unit length so that hit
    /// distances are in world units.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}
