//! Collision ray and hit record.

use lux_math::{Interval, Plane, Ray, Vec2, Vec3};
use std::ops::BitOr;

/// Query options carried by a `CollisionRay`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RayFlags(u32);

impl RayFlags {
    pub const NONE: RayFlags = RayFlags(0);
    /// Ignore triangles seen from their back side.
    pub const TEST_SINGLESIDED: RayFlags = RayFlags(1);

    #[inline]
    pub fn contains(self, other: RayFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RayFlags {
    type Output = RayFlags;

    fn bitor(self, rhs: RayFlags) -> RayFlags {
        RayFlags(self.0 | rhs.0)
    }
}

/// A ray restricted to a distance range.
#[derive(Debug, Clone, Copy)]
pub struct CollisionRay {
    pub ray: Ray,
    /// Only hits with distance inside this range count
    pub range: Interval,
    pub flags: RayFlags,
}

impl CollisionRay {
    /// Double-sided ray; `direction` must be unit length.
    pub fn new(origin: Vec3, direction: Vec3, range: Interval) -> Self {
        debug_assert!(
            (direction.length_squared() - 1.0).abs() < 1e-3,
            "collision rays need unit directions"
        );
        Self {
            ray: Ray::new(origin, direction),
            range,
            flags: RayFlags::NONE,
        }
    }

    /// Segment from `from` to `to`, shortened by `epsilon` at both ends.
    pub fn segment(from: Vec3, to: Vec3, epsilon: f32) -> Option<Self> {
        let delta = to - from;
        let length = delta.length();
        if length <= 2.0 * epsilon {
            return None;
        }
        Some(Self::new(
            from,
            delta / length,
            Interval::new(epsilon, length - epsilon),
        ))
    }

    pub fn with_flags(mut self, flags: RayFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn single_sided(&self) -> bool {
        self.flags.contains(RayFlags::TEST_SINGLESIDED)
    }
}

/// Ray/triangle intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Distance along the ray
    pub distance: f32,
    /// Post-import triangle index
    pub triangle: u32,
    /// Barycentric weights of triangle vertices 1 and 2
    pub point2d: Vec2,
    /// World-space hit point
    pub point3d: Vec3,
    /// Plane of the hit triangle
    pub plane: Plane,
    /// True if the ray hit the front (counter-clockwise) side
    pub front: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let flags = RayFlags::NONE | RayFlags::TEST_SINGLESIDED;
        assert!(flags.contains(RayFlags::TEST_SINGLESIDED));
        assert!(!RayFlags::NONE.contains(RayFlags::TEST_SINGLESIDED));
    }

    #[test]
    fn test_segment() {
        let seg = CollisionRay::segment(Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0), 0.01).unwrap();
        assert_eq!(seg.ray.direction, Vec3::Z);
        assert!((seg.range.max - 3.99).abs() < 1e-6);
        assert!(CollisionRay::segment(Vec3::ZERO, Vec3::ZERO, 0.01).is_none());
    }
}
