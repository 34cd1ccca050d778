//! Precomputed triangle for ray intersection.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use lux_math::{Interval, Plane, Vec2, Vec3};

use crate::{CollisionRay, Hit};

/// A non-degenerate triangle with edges and plane cached.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TriangleP {
    v0: Vec3,
    edge1: Vec3,
    edge2: Vec3,
    pub plane: Plane,
}

impl TriangleP {
    /// `None` for zero-area or non-finite triangles.
    pub fn new(vertices: [Vec3; 3]) -> Option<Self> {
        let [v0, v1, v2] = vertices;
        let plane = Plane::from_triangle(v0, v1, v2)?;
        Some(Self {
            v0,
            edge1: v1 - v0,
            edge2: v2 - v0,
            plane,
        })
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v0 + self.edge1, self.v0 + self.edge2]
    }

    pub fn centroid(&self) -> Vec3 {
        self.v0 + (self.edge1 + self.edge2) / 3.0
    }

    /// Möller-Trumbore ray-triangle intersection restricted to `range`.
    pub fn intersect(&self, ray: &CollisionRay, range: Interval, index: u32) -> Option<Hit> {
        let direction = ray.ray.direction;
        let h = direction.cross(self.edge2);
        let a = self.edge1.dot(h);

        // a > 0 when the ray arrives from the front (counter-clockwise) side
        let front = a > 0.0;
        if a.abs() < 1e-12 || (!front && ray.single_sided()) {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.ray.origin - self.v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(self.edge1);
        let v = f * direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * self.edge2.dot(q);
        if !range.contains(t) {
            return None;
        }

        Some(Hit {
            distance: t,
            triangle: index,
            point2d: Vec2::new(u, v),
            point3d: ray.ray.at(t),
            plane: self.plane,
            front,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RayFlags;

    fn unit_triangle() -> TriangleP {
        // XY plane at z = -1, front faces +Z
        TriangleP::new([
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(0.0, 1.0, -1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_triangle_hit() {
        let tri = unit_triangle();
        let ray = CollisionRay::new(Vec3::ZERO, -Vec3::Z, Interval::new(0.001, 100.0));
        let hit = tri.intersect(&ray, ray.range, 7).unwrap();

        assert!((hit.distance - 1.0).abs() < 1e-6);
        assert!((hit.point3d.z + 1.0).abs() < 1e-6);
        assert_eq!(hit.triangle, 7);
        assert!(hit.front);
        // Barycentric point reproduces the hit position
        let [a, b, c] = tri.vertices();
        let p = a * (1.0 - hit.point2d.x - hit.point2d.y) + b * hit.point2d.x + c * hit.point2d.y;
        assert!((p - hit.point3d).length() < 1e-5);
    }

    #[test]
    fn test_triangle_miss() {
        let tri = unit_triangle();
        let ray = CollisionRay::new(Vec3::new(5.0, 5.0, 0.0), -Vec3::Z, Interval::new(0.001, 100.0));
        assert!(tri.intersect(&ray, ray.range, 0).is_none());
    }

    #[test]
    fn test_triangle_range() {
        let tri = unit_triangle();
        let ray = CollisionRay::new(Vec3::ZERO, -Vec3::Z, Interval::new(0.001, 0.5));
        assert!(tri.intersect(&ray, ray.range, 0).is_none());
    }

    #[test]
    fn test_triangle_single_sided() {
        let tri = unit_triangle();
        let from_back = CollisionRay::new(Vec3::new(0.0, 0.0, -2.0), Vec3::Z, Interval::FORWARD);
        let hit = tri.intersect(&from_back, from_back.range, 0).unwrap();
        assert!(!hit.front);

        let single = from_back.with_flags(RayFlags::TEST_SINGLESIDED);
        assert!(tri.intersect(&single, single.range, 0).is_none());
    }

    #[test]
    fn test_degenerate_rejected() {
        assert!(TriangleP::new([Vec3::ZERO, Vec3::X, Vec3::X * 2.0]).is_none());
    }
}
