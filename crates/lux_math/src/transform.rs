// Transform utilities for Mat4
//
// Extends glam::Mat4 with the helpers the mesh wrappers need.
// Note: glam::Mat4 already provides transform_point3(), transform_vector3() and inverse()

use crate::Aabb;
use glam::{Mat3, Mat4, Vec3};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform a surface normal (inverse-transpose of the upper 3x3), renormalized.
    fn transform_normal(&self, normal: Vec3) -> Vec3;

    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;

    /// True if the transform mirrors space, which flips triangle winding.
    fn flips_winding(&self) -> bool;
}

impl Mat4Ext for Mat4 {
    fn transform_normal(&self, normal: Vec3) -> Vec3 {
        let normal_matrix = Mat3::from_mat4(*self).inverse().transpose();
        (normal_matrix * normal).normalize_or_zero()
    }

    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }
        let (lo, hi) = (aabb.min, aabb.max);
        let corners = (0..8).map(|i| {
            Vec3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            )
        });
        Aabb::enclosing(corners.map(|corner| self.transform_point3(corner)))
    }

    fn flips_winding(&self) -> bool {
        Mat3::from_mat4(*self).determinant() < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_normal_non_uniform_scale() {
        // Scaling x by 2 must tilt a 45 degree normal towards x's complement
        let mat = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = mat.transform_normal(Vec3::new(1.0, 1.0, 0.0).normalize());
        let expected = Vec3::new(0.5, 1.0, 0.0).normalize();
        assert!((n - expected).length() < 1e-5);
    }

    #[test]
    fn test_transform_aabb_translation() {
        let mat = Mat4::from_translation(Vec3::new(5.0, 5.0, 5.0));
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let transformed = mat.transform_aabb(&aabb);

        assert!((transformed.min - Vec3::splat(5.0)).length() < 1e-5);
        assert!((transformed.max - Vec3::splat(6.0)).length() < 1e-5);
    }

    #[test]
    fn test_flips_winding() {
        assert!(!Mat4::IDENTITY.flips_winding());
        assert!(Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)).flips_winding());
        assert!(!Mat4::from_rotation_y(1.0).flips_winding());
    }
}
